use alloc::{
    sync::Arc,
    vec::Vec,
};
use core::{
    fmt,
    mem,
};

use static_assertions::const_assert_eq;

use ku::{
    error::{
        Error::{
            Medium,
            NoDisk,
            NoMemory,
            Overflow,
        },
        Result,
    },
    log::{
        debug,
        error,
        trace,
        warn,
    },
    memory::size,
    sync::Spinlock,
};

use super::{
    CLUSTER_SIZE,
    SECTOR_SIZE,
    cluster::Cluster,
    disk::{
        BlockDevice,
        Bounce,
        SectorBuffer,
        ZERO_SECTOR,
    },
    fat::Fat,
};

// Used in docs.
#[allow(unused)]
use super::FileSystem;

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Метаинформация о файле --- [inode](https://en.wikipedia.org/wiki/Inode) ---
/// в том виде, в котором она хранится на диске.
///
/// Занимает ровно один сектор, за значимыми полями следуют зарезервированные нули.
#[derive(Clone, Copy, Eq, PartialEq)]
#[repr(C)]
struct DiskInode {
    /// Первый сектор данных или `0`, если данных нет.
    start: u32,

    /// Размер данных в байтах.
    length: u32,

    /// [Сигнатура](https://en.wikipedia.org/wiki/Magic_number_(programming)#Format_indicators)
    /// inode.
    magic: u32,

    /// Не используется.
    reserved: [u32; RESERVED],
}

const_assert_eq!(mem::size_of::<DiskInode>(), SECTOR_SIZE);

/// Количество зарезервированных полей [`DiskInode`].
const RESERVED: usize = 125;

impl DiskInode {
    /// Создаёт inode с данными длиной `length` байт, которые начинаются с сектора `start`.
    fn new(
        start: u32,
        length: u32,
    ) -> Self {
        Self {
            start,
            length,
            magic: Self::MAGIC,
            reserved: [0; RESERVED],
        }
    }

    /// Декодирует inode из содержимого сектора `buffer`.
    ///
    /// Возвращает ошибку [`Error::Medium`], если сигнатура не совпадает.
    fn decode(buffer: &SectorBuffer) -> Result<Self> {
        let field = |index: usize| {
            let bytes = &buffer[index * mem::size_of::<u32>() ..];
            u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
        };

        let inode = Self::new(field(0), field(1));
        if field(2) == Self::MAGIC {
            Ok(inode)
        } else {
            Err(Medium)
        }
    }

    /// Кодирует inode в содержимое сектора.
    fn encode(&self) -> SectorBuffer {
        let mut buffer = ZERO_SECTOR;
        for (bytes, field) in buffer
            .chunks_exact_mut(mem::size_of::<u32>())
            .zip([self.start, self.length, self.magic])
        {
            bytes.copy_from_slice(&field.to_le_bytes());
        }

        buffer
    }

    /// Размер данных в байтах.
    fn length(&self) -> usize {
        size::from(self.length)
    }

    /// Первый сектор данных или [`None`], если данных нет.
    fn start(&self) -> Option<usize> {
        (self.start != 0).then(|| size::from(self.start))
    }

    /// [Сигнатура](https://en.wikipedia.org/wiki/Magic_number_(programming)#Format_indicators)
    /// inode.
    const MAGIC: u32 = 0x494E_4F44;
}

impl fmt::Debug for DiskInode {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ start: {}, length: {}, magic: {:#X} }}",
            self.start,
            self.length,
            self.magic,
        )
    }
}

/// Открытый [inode](https://en.wikipedia.org/wiki/Inode).
///
/// Все открытия одного сектора разделяют одно и то же состояние.
/// Каждый [`Inode`] соответствует одному открытию и
/// должен быть закрыт через [`FileSystem::close()`].
pub struct Inode {
    /// Номер сектора, в котором хранится inode. Идентифицирует inode.
    sector: usize,

    /// Общее для всех открытий состояние inode.
    state: Arc<Spinlock<State>>,
}

impl Inode {
    /// Номер inode --- номер сектора, в котором он хранится.
    pub fn inumber(&self) -> usize {
        self.sector
    }

    /// Размер данных в байтах.
    pub fn length(&self) -> usize {
        self.state.lock().disk.length()
    }

    /// Количество открытий inode.
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count()
    }

    /// Возвращает `true`, если inode помечен для удаления при последнем закрытии.
    pub fn is_removed(&self) -> bool {
        self.state.lock().is_removed()
    }

    /// Помечает inode для удаления при последнем закрытии.
    /// Повторная пометка ничего не меняет.
    pub fn remove(&self) {
        let mut state = self.state.lock();
        if !state.removed {
            trace!(inode = self.sector, "marked for removal");
            state.removed = true;
        }
    }

    /// Запрещает запись в inode.
    /// Каждое открытие может запретить запись не более одного раза.
    ///
    /// # Panics
    ///
    /// Паникует, если количество запретов превысит количество открытий.
    pub fn deny_write(&self) {
        let mut state = self.state.lock();
        state.deny_write_count += 1;
        assert!(state.deny_write_count <= state.open_count);
    }

    /// Снимает запрет на запись, установленный [`Inode::deny_write()`].
    ///
    /// # Panics
    ///
    /// Паникует, если запрета на запись нет.
    pub fn allow_write(&self) {
        let mut state = self.state.lock();
        assert!(state.deny_write_count > 0);
        assert!(state.deny_write_count <= state.open_count);
        state.deny_write_count -= 1;
    }

    /// Возвращает `true`, если запись в inode запрещена.
    pub fn is_write_denied(&self) -> bool {
        self.state.lock().deny_write_count > 0
    }

    /// Возвращает `true`, если `a` и `b` --- открытия одного и того же inode.
    pub fn ptr_eq(
        a: &Self,
        b: &Self,
    ) -> bool {
        Arc::ptr_eq(&a.state, &b.state)
    }

    /// Создаёт в секторе `sector` inode с данными длиной `length` байт.
    ///
    /// Цепочка данных подцепляется за кластером самого inode, если он лежит в области данных.
    /// Свободный кластер inode при этом занимается.
    /// Все сектора данных заполняются нулями.
    /// При любой ошибке освобождает выделенные кластеры и ничего не записывает.
    pub(super) fn create<D: BlockDevice>(
        fat: &Fat,
        disk: &D,
        sector: usize,
        length: usize,
    ) -> Result<()> {
        let cluster_count = length.div_ceil(CLUSTER_SIZE);
        let length: u32 = size::try_into(length).map_err(|_| Overflow)?;

        let mut clusters = Vec::new();
        clusters.try_reserve_exact(cluster_count).map_err(|_| NoMemory)?;

        let own = fat.sector_to_cluster(sector).ok();
        let reserved = match own {
            Some(own) => fat.reserve(own)?,
            None => false,
        };

        let mut tail = own;
        for _ in 0 .. cluster_count {
            match fat.create_chain(tail) {
                Ok(cluster) => {
                    clusters.push(cluster);
                    tail = Some(cluster);
                },
                Err(error) => {
                    Self::rollback(fat, clusters.first().copied(), own, reserved)?;
                    debug!(sector, length, ?error, "failed to allocate the inode data");
                    return Err(error);
                },
            }
        }

        let start = match clusters.first() {
            Some(&first) => size::try_into::<u32>(fat.cluster_to_sector(first)),
            None => Ok(0),
        };

        let result = start
            .and_then(|start| disk.write(sector, &DiskInode::new(start, length).encode()))
            .and_then(|_| {
                clusters.iter().try_for_each(|&cluster| {
                    disk.write(fat.cluster_to_sector(cluster), &ZERO_SECTOR)
                })
            });

        if let Err(error) = result {
            Self::rollback(fat, clusters.first().copied(), own, reserved)?;
            return Err(error);
        }

        trace!(sector, length, clusters = clusters.len(), "created an inode");

        Ok(())
    }

    /// Читает с диска `disk` inode из сектора `sector` и создаёт для него состояние
    /// с единственным открытием.
    ///
    /// Возвращает ошибку [`Error::Medium`], если сектор не содержит inode.
    pub(super) fn load<D: BlockDevice>(
        disk: &D,
        sector: usize,
    ) -> Result<Self> {
        let mut buffer = ZERO_SECTOR;
        disk.read(sector, &mut buffer)?;

        let disk_inode = DiskInode::decode(&buffer).inspect_err(|_| {
            error!(sector, "the sector does not contain an inode");
        })?;

        Ok(Self {
            sector,
            state: Arc::new(Spinlock::new(State {
                deny_write_count: 0,
                dirty: false,
                disk: disk_inode,
                open_count: 1,
                removed: false,
            })),
        })
    }

    /// Создаёт ещё одно открытие inode из сектора `sector` с общим состоянием `state`.
    /// Само открытие должно быть уже учтено в `state`.
    pub(super) fn new(
        sector: usize,
        state: Arc<Spinlock<State>>,
    ) -> Self {
        Self { sector, state }
    }

    /// Регистрирует ещё одно открытие того же inode.
    pub(super) fn reopen(&self) -> Self {
        self.state.lock().open();

        Self::new(self.sector, self.state.clone())
    }

    /// Общее для всех открытий состояние inode.
    pub(super) fn state(&self) -> &Arc<Spinlock<State>> {
        &self.state
    }

    /// Освобождает кластер inode и цепочку его данных.
    /// Вызывается при последнем закрытии удалённого inode.
    pub(super) fn release(
        &self,
        fat: &Fat,
    ) -> Result<()> {
        let start = self.state.lock().disk.start();

        let freed = match fat.sector_to_cluster(self.sector) {
            Ok(own) => fat.remove_chain(own, None)?,
            Err(_) => match start {
                Some(start) => fat.remove_chain(fat.sector_to_cluster(start)?, None)?,
                None => 0,
            },
        };

        debug!(inode = self.sector, freed, "released a removed inode");

        Ok(())
    }

    /// Возвращает сектор диска, в котором хранится байт со смещением `offset` внутри данных,
    /// или [`None`], если `offset` не меньше длины данных или цепочка кластеров оборвана.
    pub(super) fn byte_to_sector(
        &self,
        fat: &Fat,
        offset: usize,
    ) -> Result<Option<usize>> {
        let disk = self.state.lock().disk;
        Self::sector_of(fat, &disk, offset)
    }

    /// Читает из inode в буфер `buffer` данные, начиная со смещения `offset`.
    ///
    /// Возвращает количество прочитанных байт.
    /// Оно меньше размера буфера, если достигнут конец данных,
    /// цепочка кластеров оборвана или не удалось выделить промежуточный буфер.
    pub(super) fn read<D: BlockDevice>(
        &self,
        fat: &Fat,
        disk: &D,
        offset: usize,
        buffer: &mut [u8],
    ) -> Result<usize> {
        let mut bounce = Bounce::default();
        let mut done = 0;

        while done < buffer.len() {
            let position = offset.checked_add(done).ok_or(Overflow)?;
            let disk_inode = self.state.lock().disk;
            let Some(sector) = Self::sector_of(fat, &disk_inode, position)? else {
                break;
            };

            let sector_offset = position % SECTOR_SIZE;
            let chunk = (disk_inode.length() - position)
                .min(SECTOR_SIZE - sector_offset)
                .min(buffer.len() - done);
            let destination = &mut buffer[done .. done + chunk];

            if chunk == SECTOR_SIZE {
                disk.read(sector, destination.try_into()?)?;
            } else {
                let Ok(sector_buffer) = bounce.get() else {
                    warn!(inode = self.sector, done, "no memory for a bounce buffer");
                    break;
                };
                disk.read(sector, sector_buffer)?;
                destination.copy_from_slice(&sector_buffer[sector_offset .. sector_offset + chunk]);
            }

            done += chunk;
        }

        Ok(done)
    }

    /// Записывает в inode данные из буфера `buffer`, начиная со смещения `offset`.
    /// Если запись выходит за конец данных, наращивает цепочку кластеров.
    /// Новые кластеры заполняются нулями.
    ///
    /// Возвращает количество записанных байт.
    /// Оно равно нулю, если запись в inode запрещена, и
    /// меньше размера буфера, если закончилось место на диске
    /// или не удалось выделить промежуточный буфер.
    pub(super) fn write<D: BlockDevice>(
        &self,
        fat: &Fat,
        disk: &D,
        offset: usize,
        buffer: &[u8],
    ) -> Result<usize> {
        if self.is_write_denied() || buffer.is_empty() {
            return Ok(0);
        }

        let end = offset.checked_add(buffer.len()).ok_or(Overflow)?;
        if size::try_into::<u32>(end).is_err() {
            return Err(Overflow);
        }

        self.grow(fat, disk, end)?;

        let mut bounce = Bounce::default();
        let mut done = 0;

        while done < buffer.len() {
            let position = offset + done;
            let disk_inode = self.state.lock().disk;
            let Some(sector) = Self::sector_of(fat, &disk_inode, position)? else {
                break;
            };

            let sector_offset = position % SECTOR_SIZE;
            let chunk = (disk_inode.length() - position)
                .min(SECTOR_SIZE - sector_offset)
                .min(buffer.len() - done);
            let source = &buffer[done .. done + chunk];

            if chunk == SECTOR_SIZE {
                disk.write(sector, source.try_into()?)?;
            } else {
                let Ok(sector_buffer) = bounce.get() else {
                    warn!(inode = self.sector, done, "no memory for a bounce buffer");
                    break;
                };
                disk.read(sector, sector_buffer)?;
                sector_buffer[sector_offset .. sector_offset + chunk].copy_from_slice(source);
                disk.write(sector, sector_buffer)?;
            }

            done += chunk;
        }

        Ok(done)
    }

    /// Наращивает цепочку кластеров inode, по одному кластеру за шаг, пока она не покроет
    /// и записанную длину данных, и длину `length`.
    /// Так же восстанавливается цепочка, оборванная раньше записанной длины.
    /// Новые кластеры заполняются нулями.
    ///
    /// Если место на диске закончилось, останавливается на достигнутой длине.
    fn grow<D: BlockDevice>(
        &self,
        fat: &Fat,
        disk: &D,
        length: usize,
    ) -> Result<()> {
        loop {
            let mut state = self.state.lock();

            let old_length = state.disk.length();
            let needed = old_length.max(length).div_ceil(CLUSTER_SIZE);

            let (tail, cluster_count) = match state.disk.start() {
                Some(start) => {
                    let first = fat.sector_to_cluster(start).map_err(|_| Medium)?;
                    let (last, cluster_count) = fat.last(first)?;
                    (Some(last), cluster_count)
                },
                None => {
                    let own = fat.sector_to_cluster(self.sector).ok();
                    if let Some(own) = own {
                        fat.reserve(own)?;
                    }
                    (own, 0)
                },
            };

            let capacity = cluster_count * CLUSTER_SIZE;
            if cluster_count >= needed {
                if length > old_length {
                    state.set_length(length)?;
                }
                return Ok(());
            }

            let cluster = match fat.create_chain(tail) {
                Ok(cluster) => cluster,
                Err(NoDisk) => {
                    let reachable = capacity.min(length);
                    if reachable > old_length {
                        state.set_length(reachable)?;
                    }
                    debug!(inode = self.sector, old_length, length, "no free clusters to grow");
                    return Ok(());
                },
                Err(error) => return Err(error),
            };

            let sector = fat.cluster_to_sector(cluster);
            if let Err(error) = disk.write(sector, &ZERO_SECTOR) {
                fat.remove_chain(cluster, tail)?;
                return Err(error);
            }

            if state.disk.start().is_none() {
                state.disk.start = size::try_into(sector)?;
                state.dirty = true;
            }

            let reachable = (capacity + CLUSTER_SIZE).min(length);
            if reachable > old_length {
                state.set_length(reachable)?;
            }

            trace!(inode = self.sector, %cluster, length = state.disk.length(), "grew");
        }
    }

    /// Возвращает сектор, в котором хранится байт со смещением `offset`
    /// внутри данных inode `disk`.
    fn sector_of(
        fat: &Fat,
        disk: &DiskInode,
        offset: usize,
    ) -> Result<Option<usize>> {
        let Some(start) = disk.start() else {
            return Ok(None);
        };

        if offset >= disk.length() {
            return Ok(None);
        }

        let Ok(first) = fat.sector_to_cluster(start) else {
            return Ok(None);
        };

        Ok(fat
            .nth(first, offset / CLUSTER_SIZE)?
            .map(|cluster| fat.cluster_to_sector(cluster)))
    }

    /// Освобождает частично выделенную цепочку данных, начинающуюся с `first`,
    /// и восстанавливает конец цепочки в кластере inode `own`.
    /// Если кластер `own` был занят при создании inode, `reserved`, освобождает и его.
    fn rollback(
        fat: &Fat,
        first: Option<Cluster>,
        own: Option<Cluster>,
        reserved: bool,
    ) -> Result<()> {
        match (own, first) {
            (Some(own), _) if reserved => {
                fat.remove_chain(own, None)?;
            },
            (own, Some(first)) => {
                fat.remove_chain(first, own)?;
            },
            (_, None) => {},
        }

        Ok(())
    }
}

impl fmt::Debug for Inode {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{{ sector: {}, state: {:?} }}", self.sector, *self.state.lock())
    }
}

/// Общее для всех открытий состояние inode.
#[derive(Debug)]
pub(super) struct State {
    /// Количество запретов на запись.
    deny_write_count: usize,

    /// Копия inode в памяти отличается от записанной на диске.
    dirty: bool,

    /// Копия inode в памяти.
    disk: DiskInode,

    /// Количество открытий.
    open_count: usize,

    /// Inode будет удалён при последнем закрытии.
    removed: bool,
}

impl State {
    /// Уменьшает количество открытий.
    /// Возвращает `true`, если это было последнее открытие.
    pub(super) fn close(&mut self) -> bool {
        assert!(self.open_count > 0);
        self.open_count -= 1;

        self.open_count == 0
    }

    /// Регистрирует ещё одно открытие.
    pub(super) fn open(&mut self) {
        self.open_count += 1;
    }

    /// Количество открытий.
    pub(super) fn open_count(&self) -> usize {
        self.open_count
    }

    /// Inode будет удалён при последнем закрытии.
    pub(super) fn is_removed(&self) -> bool {
        self.removed
    }

    /// Записывает inode в сектор `sector` диска `disk`, если копия в памяти изменилась.
    pub(super) fn write_back<D: BlockDevice>(
        &mut self,
        disk: &D,
        sector: usize,
    ) -> Result<()> {
        if self.dirty {
            disk.write(sector, &self.disk.encode())?;
            self.dirty = false;
            trace!(sector, length = self.disk.length(), "wrote back an inode");
        }

        Ok(())
    }

    /// Устанавливает размер данных в байтах.
    fn set_length(
        &mut self,
        length: usize,
    ) -> Result<()> {
        self.disk.length = size::try_into(length)?;
        self.dirty = true;

        Ok(())
    }
}
