use alloc::vec::Vec;
use core::mem;

use ku::{
    error::{
        Error::NoMemory,
        Result,
    },
    memory::size::Size,
};

use super::{
    SECTOR_SIZE,
    cluster::{
        Cluster,
        Link,
    },
    disk::{
        BlockDevice,
        SectorBuffer,
    },
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Количество записей таблицы FAT в одном секторе.
pub(super) const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / mem::size_of::<u32>();

/// [Таблица размещения файлов](https://en.wikipedia.org/wiki/File_Allocation_Table).
///
/// Запись номер `i` описывает кластер `i + 1`.
/// Целиком загружается в память при монтировании и целиком записывается на диск при сбросе.
pub(super) struct FatTable {
    /// Записи таблицы в том виде, в котором они хранятся на диске.
    entries: Vec<u32>,
}

impl FatTable {
    /// Создаёт таблицу на `len` кластеров, все записи которой свободны.
    ///
    /// Возвращает ошибку [`Error::NoMemory`], если не удалось выделить под неё память.
    pub(super) fn new(len: usize) -> Result<Self> {
        let mut entries = Vec::new();
        entries.try_reserve_exact(len).map_err(|_| NoMemory)?;
        entries.resize(len, 0);

        Ok(Self { entries })
    }

    /// Загружает с диска `disk` таблицу на `len` кластеров,
    /// которая начинается с сектора `fat_start`.
    pub(super) fn load<D: BlockDevice>(
        disk: &D,
        fat_start: usize,
        len: usize,
    ) -> Result<Self> {
        let mut table = Self::new(len)?;
        let mut buffer = [0; SECTOR_SIZE];

        for (sector, entries) in table.entries.chunks_mut(ENTRIES_PER_SECTOR).enumerate() {
            disk.read(fat_start + sector, &mut buffer)?;
            for (entry, bytes) in entries.iter_mut().zip(buffer.chunks_exact(mem::size_of::<u32>())) {
                *entry = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            }
        }

        Ok(table)
    }

    /// Записывает таблицу на диск `disk` в `fat_sectors` секторов, начиная с сектора `fat_start`.
    /// Хвост последнего сектора и сектора за пределами таблицы заполняются нулями.
    pub(super) fn flush<D: BlockDevice>(
        &self,
        disk: &D,
        fat_start: usize,
        fat_sectors: usize,
    ) -> Result<()> {
        let mut chunks = self.entries.chunks(ENTRIES_PER_SECTOR);

        for sector in fat_start .. fat_start + fat_sectors {
            let buffer = Self::encode(chunks.next().unwrap_or_default());
            disk.write(sector, &buffer)?;
        }

        Ok(())
    }

    /// Возвращает запись кластера `cluster`.
    ///
    /// # Panics
    ///
    /// Паникует, если `cluster` выходит за пределы таблицы.
    pub(super) fn get(
        &self,
        cluster: Cluster,
    ) -> Link {
        Link::from_raw(self.entries[cluster.index()])
    }

    /// Записывает `link` в запись кластера `cluster`.
    ///
    /// # Panics
    ///
    /// Паникует, если `cluster` выходит за пределы таблицы.
    pub(super) fn set(
        &mut self,
        cluster: Cluster,
        link: Link,
    ) {
        self.entries[cluster.index()] = link.into_raw();
    }

    /// Запись номер `index` в том виде, в котором она хранится на диске.
    pub(super) fn raw(
        &self,
        index: usize,
    ) -> u32 {
        self.entries[index]
    }

    /// Количество записей в таблице.
    pub(super) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Размер таблицы в памяти.
    pub(super) fn size(&self) -> Size {
        Size::from_slice(&self.entries)
    }

    /// Кодирует не более [`ENTRIES_PER_SECTOR`] записей `entries` в содержимое сектора.
    fn encode(entries: &[u32]) -> SectorBuffer {
        let mut buffer = [0; SECTOR_SIZE];
        for (bytes, entry) in buffer.chunks_exact_mut(mem::size_of::<u32>()).zip(entries) {
            bytes.copy_from_slice(&entry.to_le_bytes());
        }

        buffer
    }
}

#[cfg(test)]
mod test {
    use super::{
        super::{
            Cluster,
            Link,
            MemoryDisk,
        },
        ENTRIES_PER_SECTOR,
        FatTable,
    };

    #[test]
    fn flush_and_load() {
        let disk = MemoryDisk::new(4);
        let len = ENTRIES_PER_SECTOR + 3;

        let mut table = FatTable::new(len).unwrap();
        let first = Cluster::new(1).unwrap();
        let last = Cluster::new(len as u32).unwrap();
        table.set(first, Link::Next(last));
        table.set(last, Link::Terminator);
        table.flush(&disk, 1, 3).unwrap();

        let sector = disk.sector(2).unwrap();
        assert_eq!(sector[8 .. 12], 0x0FFF_FFFF_u32.to_le_bytes());
        assert!(sector[12 ..].iter().all(|&byte| byte == 0));
        assert!(disk.sector(3).unwrap().iter().all(|&byte| byte == 0));

        let loaded = FatTable::load(&disk, 1, len).unwrap();
        assert_eq!(loaded.get(first), Link::Next(last));
        assert_eq!(loaded.get(last), Link::Terminator);
        assert!(
            (1 .. len - 1)
                .all(|index| loaded.raw(index) == 0)
        );
    }
}
