use core::mem;

use static_assertions::const_assert;

use ku::{
    error::{
        Error::Medium,
        Result,
    },
    memory::size,
};

use super::{
    ROOT_DIRECTORY_CLUSTER,
    SECTOR_SIZE,
    SECTORS_PER_CLUSTER,
    disk::SectorBuffer,
    table::ENTRIES_PER_SECTOR,
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Загрузочная запись файловой системы --- аналог
/// [суперблока](https://en.wikipedia.org/wiki/Unix_File_System#Design).
///
/// Описывает геометрию файловой системы.
/// На диске занимает начало сектора [`crate::BOOT_SECTOR`],
/// остаток сектора заполнен нулями.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BootRecord {
    /// [Сигнатура](https://en.wikipedia.org/wiki/Magic_number_(programming)#Format_indicators)
    /// файловой системы.
    magic: u32,

    /// Количество секторов в кластере, всегда [`SECTORS_PER_CLUSTER`].
    sectors_per_cluster: u32,

    /// Полное количество секторов на диске.
    total_sectors: u32,

    /// Первый сектор таблицы FAT.
    fat_start: u32,

    /// Количество секторов, которые занимает таблица FAT.
    fat_sectors: u32,

    /// Кластер корневой директории.
    root_directory_cluster: u32,
}

impl BootRecord {
    /// Создаёт загрузочную запись для диска размером `total_sectors` секторов.
    ///
    /// Таблица FAT начинается сразу за загрузочной записью и занимает
    /// `ceil(total_sectors / (ENTRIES_PER_SECTOR * SECTORS_PER_CLUSTER + 1))` секторов ---
    /// этого хватает, чтобы описать все кластеры, оставшиеся под данные.
    pub(super) fn new(total_sectors: usize) -> Result<Self> {
        let fat_sectors = total_sectors.div_ceil(ENTRIES_PER_SECTOR * SECTORS_PER_CLUSTER + 1);

        let boot_record = Self {
            magic: Self::MAGIC,
            sectors_per_cluster: size::try_into(SECTORS_PER_CLUSTER)?,
            total_sectors: size::try_into(total_sectors)?,
            fat_start: size::try_into(Self::FAT_START)?,
            fat_sectors: size::try_into(fat_sectors)?,
            root_directory_cluster: ROOT_DIRECTORY_CLUSTER,
        };

        boot_record.validate()
    }

    /// Декодирует загрузочную запись из содержимого сектора `buffer`.
    /// Корректность записи не проверяет, см. [`BootRecord::has_magic()`] и
    /// [`BootRecord::validate()`].
    pub(super) fn decode(buffer: &SectorBuffer) -> Self {
        let mut fields = [0; Self::FIELD_COUNT];
        for (field, bytes) in fields.iter_mut().zip(buffer.chunks_exact(mem::size_of::<u32>())) {
            *field = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        }

        let [
            magic,
            sectors_per_cluster,
            total_sectors,
            fat_start,
            fat_sectors,
            root_directory_cluster,
        ] = fields;

        Self {
            magic,
            sectors_per_cluster,
            total_sectors,
            fat_start,
            fat_sectors,
            root_directory_cluster,
        }
    }

    /// Кодирует загрузочную запись в содержимое сектора, дополненное нулями.
    pub(super) fn encode(&self) -> SectorBuffer {
        let fields = [
            self.magic,
            self.sectors_per_cluster,
            self.total_sectors,
            self.fat_start,
            self.fat_sectors,
            self.root_directory_cluster,
        ];

        let mut buffer = [0; SECTOR_SIZE];
        for (bytes, field) in buffer.chunks_exact_mut(mem::size_of::<u32>()).zip(fields) {
            bytes.copy_from_slice(&field.to_le_bytes());
        }

        buffer
    }

    /// Возвращает `true`, если сигнатура записи совпадает с сигнатурой этой файловой системы.
    pub fn has_magic(&self) -> bool {
        self.magic == Self::MAGIC
    }

    /// Проверяет согласованность геометрии, записанной в [`BootRecord`].
    /// Возвращает ошибку [`Error::Medium`],
    /// если данные заведомо не описывают корректную файловую систему,
    /// или сам [`BootRecord`] иначе.
    pub(super) fn validate(self) -> Result<Self> {
        let fat_end = self.fat_start().checked_add(self.fat_sectors());
        let fat_capacity = self.fat_sectors() * ENTRIES_PER_SECTOR;

        let is_valid = self.has_magic() &&
            size::from(self.sectors_per_cluster) == SECTORS_PER_CLUSTER &&
            self.fat_start() > super::BOOT_SECTOR &&
            fat_end.is_some_and(|fat_end| fat_end < self.total_sectors()) &&
            fat_capacity >= self.total_sectors() - self.data_start() &&
            self.root_directory_cluster != 0 &&
            size::from(self.root_directory_cluster) <= self.total_sectors() - self.data_start();

        if is_valid { Ok(self) } else { Err(Medium) }
    }

    /// Полное количество секторов на диске.
    pub fn total_sectors(&self) -> usize {
        size::from(self.total_sectors)
    }

    /// Первый сектор таблицы FAT.
    pub fn fat_start(&self) -> usize {
        size::from(self.fat_start)
    }

    /// Количество секторов, которые занимает таблица FAT.
    pub fn fat_sectors(&self) -> usize {
        size::from(self.fat_sectors)
    }

    /// Первый сектор области данных, он же первый сектор кластера номер `1`.
    pub fn data_start(&self) -> usize {
        self.fat_start() + self.fat_sectors()
    }

    /// Кластер корневой директории.
    pub fn root_directory_cluster(&self) -> u32 {
        self.root_directory_cluster
    }

    /// Количество полей [`BootRecord`] на диске.
    const FIELD_COUNT: usize = 6;

    /// Сектор, с которого начинается таблица FAT.
    const FAT_START: usize = 1;

    /// [Сигнатура](https://en.wikipedia.org/wiki/Magic_number_(programming)#Format_indicators)
    /// файловой системы.
    const MAGIC: u32 = 0xEB3C_9000;
}

const_assert!(BootRecord::FIELD_COUNT * mem::size_of::<u32>() <= SECTOR_SIZE);
