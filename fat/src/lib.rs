//! Ядро хранения [файловой системы](https://en.wikipedia.org/wiki/File_system)
//! учебной операционной системы.
//!
//! Файл состоит из цепочки кластеров, связанных через
//! [таблицу размещения файлов](https://en.wikipedia.org/wiki/File_Allocation_Table) (FAT).
//! Поверх цепочек работает слой [inode](https://en.wikipedia.org/wiki/Inode),
//! который отображает смещения внутри файла в номера секторов диска.
//!
//! Порядок монтирования:
//! [`BootRecord`] → таблица FAT → битовая карта кластеров → кэш открытых [`Inode`].

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

extern crate alloc;

/// [Битовая карта](https://en.wikipedia.org/wiki/Free-space_bitmap)
/// свободных и занятых кластеров.
/// Восстанавливается по таблице FAT при каждом монтировании и на диске не хранится.
mod bitmap;

/// Загрузочная запись --- аналог
/// [суперблока](https://en.wikipedia.org/wiki/Unix_File_System#Design),
/// описывающий геометрию файловой системы.
mod boot_record;

/// Номер кластера [`Cluster`] и значение записи таблицы FAT [`Link`].
mod cluster;

/// Интерфейс блочного устройства и его реализация в памяти.
mod disk;

/// Операции выделения и освобождения кластеров и цепочек кластеров.
mod fat;

/// Интерфейс к файловой системе.
mod file_system;

/// Метаинформация о файле --- [inode](https://en.wikipedia.org/wiki/Inode).
mod inode;

/// [Таблица размещения файлов](https://en.wikipedia.org/wiki/File_Allocation_Table).
mod table;

use static_assertions::const_assert_eq;

pub use boot_record::BootRecord;
pub use cluster::{
    Cluster,
    Link,
};
pub use disk::{
    BlockDevice,
    MemoryDisk,
    SectorBuffer,
    Stats,
};
pub use fat::Fat;
pub use file_system::FileSystem;
pub use inode::Inode;

/// Размер сектора диска --- единицы обмена с блочным устройством.
pub const SECTOR_SIZE: usize = 512;

/// Количество секторов в одном кластере.
pub const SECTORS_PER_CLUSTER: usize = 1;

/// Размер кластера в байтах.
pub const CLUSTER_SIZE: usize = SECTOR_SIZE * SECTORS_PER_CLUSTER;

/// Номер сектора, в котором хранится загрузочная запись [`BootRecord`].
pub const BOOT_SECTOR: usize = 0;

/// Номер кластера [корневой директории](https://en.wikipedia.org/wiki/Root_directory).
pub const ROOT_DIRECTORY_CLUSTER: u32 = 1;

// Отображение смещения внутри файла в сектор проходит одну ссылку цепочки на сектор.
const_assert_eq!(SECTORS_PER_CLUSTER, 1);

#[doc(hidden)]
pub mod test_scaffolding {
    pub use super::bitmap::test_scaffolding::*;
}
