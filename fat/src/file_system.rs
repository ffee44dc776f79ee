use alloc::{
    collections::BTreeMap,
    sync::Arc,
};
use core::fmt;

use ku::{
    error::Result,
    log::{
        debug,
        error,
        info,
        trace,
        warn,
    },
    memory::size::Size,
    sync::Spinlock,
};

use super::{
    disk::BlockDevice,
    fat::Fat,
    inode::{
        Inode,
        State,
    },
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Интерфейс к файловой системе.
///
/// Владеет блочным устройством `D`, менеджером кластеров [`Fat`]
/// и реестром открытых [`Inode`].
/// Блокировки захватываются в порядке: реестр открытых inode,
/// состояние inode, состояние [`Fat`].
pub struct FileSystem<D: BlockDevice> {
    /// Блочное устройство, на котором находится файловая система.
    disk: D,

    /// Менеджер кластеров.
    fat: Fat,

    /// Открытые inode по номеру их сектора.
    /// Все открытия одного сектора разделяют одно состояние.
    open_inodes: Spinlock<BTreeMap<usize, Arc<Spinlock<State>>>>,

    /// Файловая система уже сброшена на диск методом [`FileSystem::unmount()`].
    unmounted: bool,
}

impl<D: BlockDevice> FileSystem<D> {
    /// [Монтирует](https://en.wikipedia.org/wiki/Mount_(computing))
    /// файловую систему с диска `disk`.
    pub fn mount(disk: D) -> Result<Self> {
        let fat = Fat::mount(&disk)?;

        Ok(Self::new(disk, fat))
    }

    /// Форматирует диск `disk` и монтирует на нём пустую файловую систему.
    pub fn format(disk: D) -> Result<Self> {
        let fat = Fat::format(&disk)?;

        Ok(Self::new(disk, fat))
    }

    /// Записывает на диск все изменённые inode, загрузочную запись и таблицу FAT.
    pub fn flush(&self) -> Result<()> {
        let open_inodes = self.open_inodes.lock();
        for (&sector, state) in open_inodes.iter() {
            state.lock().write_back(&self.disk, sector)?;
        }
        drop(open_inodes);

        self.fat.flush(&self.disk)
    }

    /// Сбрасывает файловую систему на диск и закрывает её.
    ///
    /// Открытые inode при этом считаются утечкой.
    /// С включённой опцией `forbid-leaks` это приводит к панике.
    pub fn unmount(mut self) -> Result<()> {
        let open_inode_count = self.open_inode_count();
        if open_inode_count != 0 {
            if cfg!(feature = "forbid-leaks") {
                panic!("unmounting with {open_inode_count} open inodes");
            }
            warn!(open_inode_count, "unmounting with open inodes");
        }

        self.flush()?;
        self.unmounted = true;

        info!(
            free_space = %Size::bytes(self.free_space()),
            used_space = %Size::bytes(self.used_space()),
            "unmounted the file system",
        );

        Ok(())
    }

    /// Менеджер кластеров.
    pub fn fat(&self) -> &Fat {
        &self.fat
    }

    /// Блочное устройство.
    pub fn disk(&self) -> &D {
        &self.disk
    }

    /// Создаёт в секторе `sector` inode с данными длиной `length` байт,
    /// заполненными нулями.
    ///
    /// Возвращает ошибку [`Error::NoDisk`], если на диске не хватает места.
    /// В этом случае диск не меняется.
    pub fn create(
        &self,
        sector: usize,
        length: usize,
    ) -> Result<()> {
        Inode::create(&self.fat, &self.disk, sector, length)
    }

    /// Открывает inode, хранящийся в секторе `sector`.
    /// Повторное открытие того же сектора разделяет состояние с уже открытым inode.
    ///
    /// Возвращает ошибку [`Error::Medium`], если сектор не содержит inode.
    pub fn open(
        &self,
        sector: usize,
    ) -> Result<Inode> {
        let mut open_inodes = self.open_inodes.lock();

        if let Some(state) = open_inodes.get(&sector) {
            state.lock().open();
            return Ok(Inode::new(sector, state.clone()));
        }

        let inode = Inode::load(&self.disk, sector)?;
        open_inodes.insert(sector, inode.state().clone());

        trace!(sector, open_inodes = open_inodes.len(), "opened an inode");

        Ok(inode)
    }

    /// Открывает ещё раз уже открытый `inode`.
    pub fn reopen(
        &self,
        inode: &Inode,
    ) -> Inode {
        inode.reopen()
    }

    /// Закрывает `inode`.
    ///
    /// При последнем закрытии удаляет inode из реестра открытых.
    /// Если inode был помечен для удаления, освобождает его кластер и цепочку данных,
    /// иначе записывает его на диск, если он изменился.
    pub fn close(
        &self,
        inode: Inode,
    ) -> Result<()> {
        let sector = inode.inumber();

        let mut open_inodes = self.open_inodes.lock();
        let mut state = inode.state().lock();
        if !state.close() {
            return Ok(());
        }
        open_inodes.remove(&sector);
        drop(open_inodes);

        if state.is_removed() {
            drop(state);
            inode.release(&self.fat)
        } else {
            state.write_back(&self.disk, sector)
        }
    }

    /// Читает из `inode` в буфер `buffer` данные, начиная со смещения `offset`.
    ///
    /// Возвращает количество прочитанных байт.
    /// Оно меньше размера буфера, если данные закончились.
    pub fn read(
        &self,
        inode: &Inode,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<usize> {
        inode.read(&self.fat, &self.disk, offset, buffer)
    }

    /// Записывает в `inode` данные из буфера `buffer`, начиная со смещения `offset`.
    /// При необходимости расширяет данные, новые байты заполняются нулями.
    ///
    /// Возвращает количество записанных байт.
    /// Оно равно нулю, если запись в `inode` запрещена,
    /// и меньше размера буфера, если на диске закончилось место.
    pub fn write(
        &self,
        inode: &Inode,
        offset: usize,
        buffer: &[u8],
    ) -> Result<usize> {
        inode.write(&self.fat, &self.disk, offset, buffer)
    }

    /// Возвращает сектор диска, в котором хранится байт `inode` со смещением `offset`,
    /// или [`None`], если такого байта нет.
    pub fn byte_to_sector(
        &self,
        inode: &Inode,
        offset: usize,
    ) -> Result<Option<usize>> {
        inode.byte_to_sector(&self.fat, offset)
    }

    /// Количество различных открытых inode.
    pub fn open_inode_count(&self) -> usize {
        self.open_inodes.lock().len()
    }

    /// Возвращает размер свободного места файловой системы в байтах.
    pub fn free_space(&self) -> usize {
        self.fat.free_space()
    }

    /// Возвращает размер занятого места файловой системы в байтах.
    pub fn used_space(&self) -> usize {
        self.fat.cluster_count() * super::CLUSTER_SIZE - self.free_space()
    }

    /// Собирает [`FileSystem`] с пустым реестром открытых inode.
    fn new(
        disk: D,
        fat: Fat,
    ) -> Self {
        Self {
            disk,
            fat,
            open_inodes: Spinlock::new(BTreeMap::new()),
            unmounted: false,
        }
    }
}

impl<D: BlockDevice> Drop for FileSystem<D> {
    fn drop(&mut self) {
        if self.unmounted {
            return;
        }

        if let Err(error) = self.flush() {
            error!(?error, "error on the file system unmount");
        }

        debug!(
            open_inodes = self.open_inode_count(),
            free_space = %Size::bytes(self.free_space()),
            "unmount",
        );
    }
}

impl<D: BlockDevice + fmt::Debug> fmt::Debug for FileSystem<D> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ disk: {:?}, fat: {:?}, open_inodes: {} }}",
            self.disk,
            self.fat,
            self.open_inode_count(),
        )
    }
}
