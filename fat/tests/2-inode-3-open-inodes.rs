use std::{
    sync::Arc,
    thread,
    time::Duration,
};

use rstest::rstest;

use fat::{
    FileSystem,
    Inode,
    MemoryDisk,
    SECTOR_SIZE,
};
use ku::{
    Error,
    log::debug,
};

mod fs_helpers;
mod log;

use fs_helpers::{
    SMALL_DISK,
    allocate_inode_sector,
    create_inode,
    format,
    pattern,
};

fn record_length(
    disk: &MemoryDisk,
    sector: usize,
) -> usize {
    let record = disk.sector(sector).unwrap();
    usize::try_from(u32::from_le_bytes(record[4 .. 8].try_into().unwrap())).unwrap()
}

#[rstest]
fn opens_alias() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let sector = create_inode(&file_system, 0);
    let a = file_system.open(sector).unwrap();
    let b = file_system.open(sector).unwrap();

    assert!(Inode::ptr_eq(&a, &b));
    assert_eq!(a.open_count(), 2);
    assert_eq!(file_system.open_inode_count(), 1);

    let c = file_system.reopen(&b);
    assert!(Inode::ptr_eq(&a, &c));
    assert_eq!(a.open_count(), 3);
    assert_eq!(file_system.open_inode_count(), 1);

    assert_eq!(file_system.write(&a, 0, b"shared"), Ok(6));
    assert_eq!(b.length(), 6);
    let mut buffer = [0; 6];
    assert_eq!(file_system.read(&c, 0, &mut buffer), Ok(6));
    assert_eq!(&buffer, b"shared");

    let other = file_system.open(create_inode(&file_system, 0)).unwrap();
    assert!(!Inode::ptr_eq(&a, &other));
    assert_eq!(file_system.open_inode_count(), 2);

    for inode in [a, b, c, other] {
        file_system.close(inode).unwrap();
    }
    assert_eq!(file_system.open_inode_count(), 0);
}

#[rstest]
fn removed_inode_is_released_at_the_last_close() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let free = file_system.fat().free_count();
    let sector = allocate_inode_sector(&file_system);
    file_system.create(sector, 3 * SECTOR_SIZE).unwrap();
    assert_eq!(file_system.fat().free_count(), free - 4);

    let a = file_system.open(sector).unwrap();
    let b = file_system.open(sector).unwrap();
    assert_eq!(file_system.write(&a, 3 * SECTOR_SIZE, b"grown"), Ok(5));
    assert_eq!(file_system.fat().free_count(), free - 5);

    a.remove();
    b.remove();
    assert!(a.is_removed());

    file_system.close(a).unwrap();
    assert_eq!(file_system.fat().free_count(), free - 5);
    assert_eq!(file_system.open_inode_count(), 1);

    file_system.close(b).unwrap();
    assert_eq!(file_system.fat().free_count(), free);
    assert_eq!(file_system.open_inode_count(), 0);

    let own = file_system.fat().sector_to_cluster(sector).unwrap();
    assert!(file_system.fat().is_free(own).unwrap());
}

#[rstest]
fn closing_a_live_inode_frees_nothing() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let sector = create_inode(&file_system, 2 * SECTOR_SIZE);
    let free = file_system.fat().free_count();

    let inode = file_system.open(sector).unwrap();
    file_system.close(inode).unwrap();

    assert_eq!(file_system.fat().free_count(), free);
    assert_eq!(file_system.open_inode_count(), 0);

    let inode = file_system.open(sector).unwrap();
    assert_eq!(inode.length(), 2 * SECTOR_SIZE);
    assert_eq!(inode.open_count(), 1);
    file_system.close(inode).unwrap();
}

#[rstest]
fn last_close_writes_the_length_back() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let sector = create_inode(&file_system, 0);
    let a = file_system.open(sector).unwrap();
    let b = file_system.reopen(&a);

    assert_eq!(file_system.write(&a, 0, &pattern(700, 1)), Ok(700));
    assert_eq!(record_length(&disk, sector), 0);

    file_system.close(a).unwrap();
    assert_eq!(record_length(&disk, sector), 0);

    file_system.close(b).unwrap();
    assert_eq!(record_length(&disk, sector), 700);

    let inode = file_system.open(sector).unwrap();
    assert_eq!(inode.length(), 700);
    file_system.close(inode).unwrap();
}

#[rstest]
fn flush_writes_open_inodes_back() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let sector = create_inode(&file_system, 0);
    let inode = file_system.open(sector).unwrap();
    assert_eq!(file_system.write(&inode, 100, b"tail"), Ok(4));

    file_system.flush().unwrap();
    assert_eq!(record_length(&disk, sector), 104);

    file_system.close(inode).unwrap();
}

#[rstest]
fn remount_keeps_the_data() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let data = pattern(3 * SECTOR_SIZE + 11, 0x42);

    let sector = {
        let file_system = format(&disk);
        let sector = create_inode(&file_system, 0);
        let inode = file_system.open(sector).unwrap();
        assert_eq!(file_system.write(&inode, 0, &data), Ok(data.len()));
        file_system.close(inode).unwrap();
        file_system.unmount().unwrap();
        sector
    };

    let file_system = FileSystem::mount(&disk).unwrap();
    let inode = file_system.open(sector).unwrap();
    assert_eq!(inode.length(), data.len());

    let mut buffer = vec![0; data.len() + 100];
    assert_eq!(file_system.read(&inode, 0, &mut buffer), Ok(data.len()));
    assert_eq!(buffer[.. data.len()], data);

    let own = file_system.fat().sector_to_cluster(sector).unwrap();
    assert!(!file_system.fat().is_free(own).unwrap());

    file_system.close(inode).unwrap();
}

#[cfg(not(feature = "forbid-leaks"))]
#[rstest]
fn unmount_with_open_inodes() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    let sector = create_inode(&file_system, 0);
    let inode = file_system.open(sector).unwrap();
    assert_eq!(file_system.write(&inode, 0, b"leaked"), Ok(6));
    drop(inode);

    file_system.unmount().unwrap();
    assert_eq!(record_length(&disk, sector), 6);
}

#[rstest]
fn open_missing_inode() {
    let disk = MemoryDisk::new(SMALL_DISK);
    let file_system = format(&disk);

    assert_eq!(file_system.open(SMALL_DISK).err(), Some(Error::Medium));
    assert_eq!(file_system.open_inode_count(), 0);
}

#[rstest]
#[timeout(Duration::from_secs(60))]
fn concurrent_writers() {
    const THREAD_COUNT: usize = 4;
    const FILE_SIZE: usize = 20 * SECTOR_SIZE + 123;
    const CHUNK: usize = 300;

    let disk = Arc::new(MemoryDisk::new(1000));
    let file_system = FileSystem::format(disk.clone()).unwrap();

    let sectors: Vec<_> = (0 .. THREAD_COUNT).map(|_| create_inode(&file_system, 0)).collect();

    thread::scope(|s| {
        for (thread, &sector) in sectors.iter().enumerate() {
            let file_system = &file_system;
            s.spawn(move || {
                let data = pattern(FILE_SIZE, thread as u8);
                let inode = file_system.open(sector).unwrap();

                for offset in (0 .. FILE_SIZE).step_by(CHUNK) {
                    let end = (offset + CHUNK).min(FILE_SIZE);
                    assert_eq!(
                        file_system.write(&inode, offset, &data[offset .. end]),
                        Ok(end - offset),
                    );
                }

                file_system.close(inode).unwrap();
            });
        }
    });

    for (thread, &sector) in sectors.iter().enumerate() {
        let inode = file_system.open(sector).unwrap();
        let mut buffer = vec![0; FILE_SIZE];
        assert_eq!(file_system.read(&inode, 0, &mut buffer), Ok(FILE_SIZE));
        assert_eq!(buffer, pattern(FILE_SIZE, thread as u8));
        file_system.close(inode).unwrap();
    }

    let used = THREAD_COUNT * (1 + FILE_SIZE.div_ceil(SECTOR_SIZE));
    assert_eq!(file_system.fat().free_count(), file_system.fat().cluster_count() - 1 - used);

    debug!(free = file_system.fat().free_count(), stats = ?disk.stats());
    assert_eq!(file_system.open_inode_count(), 0);
}

#[ctor::ctor]
fn init() {
    log::init();
}
