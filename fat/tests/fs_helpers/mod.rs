#![allow(dead_code)]

use fat::{
    BlockDevice,
    Cluster,
    FileSystem,
    Link,
    MemoryDisk,
    SECTOR_SIZE,
};

/// Количество секторов диска в небольших сценариях.
pub const SMALL_DISK: usize = 64;

/// Форматирует `disk` и монтирует на нём файловую систему.
pub fn format(disk: &MemoryDisk) -> FileSystem<&MemoryDisk> {
    FileSystem::format(disk).unwrap()
}

/// Выделяет кластер под inode так, как это делает слой директорий,
/// и возвращает номер его сектора.
pub fn allocate_inode_sector<D: BlockDevice>(file_system: &FileSystem<D>) -> usize {
    let cluster = file_system.fat().create_chain(None).unwrap();
    file_system.fat().cluster_to_sector(cluster)
}

/// Создаёт inode с данными длиной `length` в новом секторе и возвращает этот сектор.
pub fn create_inode<D: BlockDevice>(
    file_system: &FileSystem<D>,
    length: usize,
) -> usize {
    let sector = allocate_inode_sector(file_system);
    file_system.create(sector, length).unwrap();
    sector
}

/// Собирает кластеры цепочки, начиная с `start`.
pub fn chain<D: BlockDevice>(
    file_system: &FileSystem<D>,
    start: Cluster,
) -> Vec<Cluster> {
    let mut chain = vec![start];

    while let Link::Next(next) = file_system.fat().get(*chain.last().unwrap()).unwrap() {
        assert!(chain.len() <= file_system.fat().cluster_count(), "looped chain");
        chain.push(next);
    }

    chain
}

/// Заполняет буфер размера `len` узнаваемым содержимым, зависящим от `seed`.
pub fn pattern(
    len: usize,
    seed: u8,
) -> Vec<u8> {
    (0 .. len).map(|i| (i % 251) as u8 ^ seed).collect()
}

/// Количество секторов данных, которые нужны для `length` байт.
pub fn sectors_for(length: usize) -> usize {
    length.div_ceil(SECTOR_SIZE)
}
