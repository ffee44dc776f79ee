use alloc::{
    boxed::Box,
    sync::Arc,
    vec,
    vec::Vec,
};
use core::{
    fmt,
    ops::Range,
    sync::atomic::{
        AtomicUsize,
        Ordering,
    },
};

use ku::{
    error::{
        Error::{
            Medium,
            NoMemory,
        },
        Result,
    },
    log::error,
    memory::size::Size,
    sync::Spinlock,
};

use super::SECTOR_SIZE;

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Содержимое одного сектора диска.
pub type SectorBuffer = [u8; SECTOR_SIZE];

/// Блочное устройство, с которым работает файловая система.
///
/// Обмен идёт целыми секторами размера [`SECTOR_SIZE`],
/// синхронно и по абсолютному номеру сектора.
/// Данные считаются сохранёнными на носителе, как только [`BlockDevice::write()`] вернул управление.
pub trait BlockDevice {
    /// Читает сектор номер `sector` в буфер `buffer`.
    fn read(
        &self,
        sector: usize,
        buffer: &mut SectorBuffer,
    ) -> Result<()>;

    /// Записывает буфер `buffer` в сектор номер `sector`.
    fn write(
        &self,
        sector: usize,
        buffer: &SectorBuffer,
    ) -> Result<()>;

    /// Количество секторов на устройстве.
    fn sector_count(&self) -> Result<usize>;
}

impl<T: BlockDevice + ?Sized> BlockDevice for &T {
    fn read(
        &self,
        sector: usize,
        buffer: &mut SectorBuffer,
    ) -> Result<()> {
        (**self).read(sector, buffer)
    }

    fn write(
        &self,
        sector: usize,
        buffer: &SectorBuffer,
    ) -> Result<()> {
        (**self).write(sector, buffer)
    }

    fn sector_count(&self) -> Result<usize> {
        (**self).sector_count()
    }
}

impl<T: BlockDevice + ?Sized> BlockDevice for Arc<T> {
    fn read(
        &self,
        sector: usize,
        buffer: &mut SectorBuffer,
    ) -> Result<()> {
        (**self).read(sector, buffer)
    }

    fn write(
        &self,
        sector: usize,
        buffer: &SectorBuffer,
    ) -> Result<()> {
        (**self).write(sector, buffer)
    }

    fn sector_count(&self) -> Result<usize> {
        (**self).sector_count()
    }
}

/// Диск, целиком хранящийся в памяти.
pub struct MemoryDisk {
    /// Содержимое диска.
    data: Spinlock<Vec<u8>>,

    /// Количество секторов диска.
    sector_count: usize,

    /// Количество прочитанных секторов.
    reads: AtomicUsize,

    /// Количество записанных секторов.
    writes: AtomicUsize,
}

impl MemoryDisk {
    /// Создаёт диск из `sector_count` секторов, заполненных нулями.
    pub fn new(sector_count: usize) -> Self {
        Self {
            data: Spinlock::new(vec![0; sector_count * SECTOR_SIZE]),
            sector_count,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Возвращает копию сектора номер `sector` в обход статистики.
    pub fn sector(
        &self,
        sector: usize,
    ) -> Result<SectorBuffer> {
        let data = self.data.lock();
        let mut buffer = [0; SECTOR_SIZE];
        buffer.copy_from_slice(&data[self.range(sector)?]);

        Ok(buffer)
    }

    /// Статистика обменов с диском.
    pub fn stats(&self) -> Stats {
        Stats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    /// Диапазон байт, который занимает сектор номер `sector`.
    ///
    /// Возвращает ошибку [`Error::Medium`], если такого сектора на диске нет.
    fn range(
        &self,
        sector: usize,
    ) -> Result<Range<usize>> {
        if sector < self.sector_count {
            let start = sector * SECTOR_SIZE;
            Ok(start .. start + SECTOR_SIZE)
        } else {
            error!(sector, sector_count = self.sector_count, "sector is out of the disk");
            Err(Medium)
        }
    }
}

impl BlockDevice for MemoryDisk {
    fn read(
        &self,
        sector: usize,
        buffer: &mut SectorBuffer,
    ) -> Result<()> {
        let data = self.data.lock();
        buffer.copy_from_slice(&data[self.range(sector)?]);
        self.reads.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn write(
        &self,
        sector: usize,
        buffer: &SectorBuffer,
    ) -> Result<()> {
        let mut data = self.data.lock();
        data[self.range(sector)?].copy_from_slice(buffer);
        self.writes.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    fn sector_count(&self) -> Result<usize> {
        Ok(self.sector_count)
    }
}

impl fmt::Debug for MemoryDisk {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ size: {}, stats: {:?} }}",
            Size::bytes(self.sector_count * SECTOR_SIZE),
            self.stats(),
        )
    }
}

/// Статистика обменов с [`MemoryDisk`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    /// Количество прочитанных секторов.
    pub reads: usize,

    /// Количество записанных секторов.
    pub writes: usize,
}

/// Промежуточный буфер размером в сектор для обменов, которые не покрывают сектор целиком.
/// Память под него выделяется при первом обращении и освобождается вместе с [`Bounce`].
#[derive(Default)]
pub(super) struct Bounce(Option<Box<SectorBuffer>>);

impl Bounce {
    /// Возвращает буфер, при необходимости выделяя под него память.
    ///
    /// Возвращает ошибку [`Error::NoMemory`], если выделить память не удалось.
    pub(super) fn get(&mut self) -> Result<&mut SectorBuffer> {
        if self.0.is_none() {
            let mut buffer = Vec::new();
            buffer.try_reserve_exact(SECTOR_SIZE).map_err(|_| NoMemory)?;
            buffer.resize(SECTOR_SIZE, 0);
            self.0 = Some(buffer.into_boxed_slice().try_into().map_err(|_| NoMemory)?);
        }

        self.0.as_deref_mut().ok_or(NoMemory)
    }
}

/// Сектор, заполненный нулями.
pub(super) const ZERO_SECTOR: SectorBuffer = [0; SECTOR_SIZE];
