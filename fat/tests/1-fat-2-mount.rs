use rstest::rstest;

use fat::{
    BOOT_SECTOR,
    BlockDevice,
    Cluster,
    Fat,
    FileSystem,
    Link,
    MemoryDisk,
    SECTOR_SIZE,
};
use ku::{
    Error,
    log::debug,
};

mod log;

fn assert_bitmap_matches_table(fat: &Fat) {
    for number in 1 ..= u32::try_from(fat.cluster_count()).unwrap() {
        let cluster = Cluster::new(number).unwrap();
        assert_eq!(
            fat.is_free(cluster).unwrap(),
            fat.get(cluster).unwrap().is_free(),
            "bitmap and table disagree on cluster {cluster}",
        );
    }
}

fn boot_sector(fields: [u32; 6]) -> [u8; SECTOR_SIZE] {
    let mut buffer = [0; SECTOR_SIZE];
    for (bytes, field) in buffer.chunks_exact_mut(4).zip(fields) {
        bytes.copy_from_slice(&field.to_le_bytes());
    }
    buffer
}

#[rstest]
#[case(64, 1, 2)]
#[case(129, 1, 2)]
#[case(130, 2, 3)]
#[case(20_000, 156, 157)]
fn geometry(
    #[case] sector_count: usize,
    #[case] fat_sectors: usize,
    #[case] data_start: usize,
) {
    let disk = MemoryDisk::new(sector_count);
    let fat = Fat::format(&disk).unwrap();

    let boot_record = fat.boot_record();
    assert_eq!(boot_record.total_sectors(), sector_count);
    assert_eq!(boot_record.fat_start(), 1);
    assert_eq!(boot_record.fat_sectors(), fat_sectors);
    assert_eq!(fat.data_start(), data_start);
    assert_eq!(fat.fat_length(), sector_count - data_start);
    assert_eq!(fat.cluster_count(), fat.fat_length());
    assert_eq!(fat.last_cluster(), sector_count - 1);
    assert!(fat_sectors * SECTOR_SIZE / 4 >= fat.fat_length());

    let boot_sector = disk.sector(BOOT_SECTOR).unwrap();
    assert_eq!(boot_sector[.. 4], 0xEB3C_9000_u32.to_le_bytes());
    assert!(boot_sector[24 ..].iter().all(|&byte| byte == 0));
}

#[rstest]
fn format_reserves_the_root_directory() {
    let disk = MemoryDisk::new(64);
    let fat = Fat::format(&disk).unwrap();

    let root = Cluster::new(fat.boot_record().root_directory_cluster()).unwrap();
    assert_eq!(fat.get(root), Ok(Link::Terminator));
    assert!(!fat.is_free(root).unwrap());
    assert_eq!(fat.free_count(), 61);
    assert_eq!(fat.free_space(), 61 * SECTOR_SIZE);

    let fat_sector = disk.sector(1).unwrap();
    assert_eq!(fat_sector[.. 4], 0x0FFF_FFFF_u32.to_le_bytes());
    assert!(fat_sector[4 ..].iter().all(|&byte| byte == 0));

    assert_bitmap_matches_table(&fat);
}

#[rstest]
fn blank_disk() {
    let disk = MemoryDisk::new(64);
    let fat = Fat::mount(&disk).unwrap();

    assert_eq!(fat.data_start(), 2);
    assert_eq!(fat.fat_length(), 62);
    assert_eq!(fat.free_count(), 62);
    assert_bitmap_matches_table(&fat);
}

#[rstest]
fn remount_rebuilds_the_bitmap() {
    let disk = MemoryDisk::new(300);

    let chains = {
        let fat = Fat::format(&disk).unwrap();

        let mut chains = Vec::new();
        for length in [1, 3, 7] {
            let head = fat.create_chain(None).unwrap();
            let mut tail = head;
            for _ in 1 .. length {
                tail = fat.create_chain(Some(tail)).unwrap();
            }
            chains.push((head, length));
        }

        fat.flush(&disk).unwrap();
        chains
    };

    let fat = Fat::mount(&disk).unwrap();
    debug!(?fat, "remounted");

    assert_eq!(fat.free_count(), fat.cluster_count() - 1 - 1 - 3 - 7);
    assert_bitmap_matches_table(&fat);

    for (head, length) in chains {
        assert!(fat.nth(head, length - 1).unwrap().is_some());
        assert_eq!(fat.nth(head, length), Ok(None));
    }
}

#[rstest]
fn release_keeps_table_entries() {
    let disk = MemoryDisk::new(64);

    {
        let fat = Fat::format(&disk).unwrap();
        let head = fat.create_chain(None).unwrap();
        let tail = fat.create_chain(Some(head)).unwrap();
        assert_eq!(fat.remove_chain(head, None), Ok(2));
        assert_eq!(fat.free_count(), 61);
        assert_eq!(fat.get(head), Ok(Link::Next(tail)));
        fat.flush(&disk).unwrap();
    }

    let fat = Fat::mount(&disk).unwrap();
    assert_eq!(fat.free_count(), 59);
    assert_bitmap_matches_table(&fat);
}

#[rstest]
fn corrupted_boot_record() {
    let disk = MemoryDisk::new(64);

    let too_many_fat_sectors = boot_sector([0xEB3C_9000, 1, 64, 1, 100, 1]);
    disk.write(BOOT_SECTOR, &too_many_fat_sectors).unwrap();
    assert_eq!(Fat::mount(&disk).err(), Some(Error::Medium));

    let too_few_fat_sectors = boot_sector([0xEB3C_9000, 1, 64 * 1024, 1, 1, 1]);
    let large_disk = MemoryDisk::new(64 * 1024);
    large_disk.write(BOOT_SECTOR, &too_few_fat_sectors).unwrap();
    assert_eq!(Fat::mount(&large_disk).err(), Some(Error::Medium));

    let wrong_cluster_size = boot_sector([0xEB3C_9000, 8, 64, 1, 1, 1]);
    disk.write(BOOT_SECTOR, &wrong_cluster_size).unwrap();
    assert_eq!(Fat::mount(&disk).err(), Some(Error::Medium));
}

#[rstest]
fn file_system_larger_than_disk() {
    let large = MemoryDisk::new(128);
    drop(Fat::format(&large).unwrap());

    let small = MemoryDisk::new(64);
    small.write(BOOT_SECTOR, &large.sector(BOOT_SECTOR).unwrap()).unwrap();

    assert_eq!(Fat::mount(&small).err(), Some(Error::Medium));
}

#[rstest]
fn file_system_lifecycle() {
    let disk = MemoryDisk::new(64);

    let file_system = FileSystem::format(&disk).unwrap();
    assert_eq!(file_system.free_space(), 61 * SECTOR_SIZE);
    assert_eq!(file_system.used_space(), SECTOR_SIZE);
    let cluster = file_system.fat().create_chain(None).unwrap();
    file_system.unmount().unwrap();

    let file_system = FileSystem::mount(&disk).unwrap();
    assert!(!file_system.fat().is_free(cluster).unwrap());
    assert_eq!(file_system.free_space(), 60 * SECTOR_SIZE);
    drop(file_system);

    let stats = disk.stats();
    debug!(?stats, "disk stats");
    assert!(stats.reads > 0);
    assert!(stats.writes > 0);
}

#[ctor::ctor]
fn init() {
    log::init();
}
