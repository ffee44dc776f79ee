use core::fmt;

use ku::{
    error::{
        Error::{
            InvalidArgument,
            Medium,
        },
        Result,
    },
    log::{
        error,
        info,
        trace,
        warn,
    },
    memory::size::Size,
    sync::Spinlock,
};

use super::{
    BOOT_SECTOR,
    CLUSTER_SIZE,
    SECTORS_PER_CLUSTER,
    bitmap::ClusterBitmap,
    boot_record::BootRecord,
    cluster::{
        Cluster,
        Link,
    },
    disk::{
        BlockDevice,
        ZERO_SECTOR,
    },
    table::FatTable,
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Менеджер кластеров: загрузочная запись, таблица FAT и битовая карта свободных кластеров.
///
/// Все изменения таблицы и битовой карты выполняются под одной блокировкой,
/// которая держится на протяжении всей операции.
pub struct Fat {
    /// Загрузочная запись, описывающая геометрию файловой системы.
    boot_record: BootRecord,

    /// Первый сектор области данных.
    data_start: usize,

    /// Количество кластеров в области данных, оно же количество записей таблицы FAT.
    fat_length: usize,

    /// Номер последнего сектора диска.
    last_cluster: usize,

    /// Таблица FAT и битовая карта кластеров.
    state: Spinlock<State>,
}

impl Fat {
    /// [Монтирует](https://en.wikipedia.org/wiki/Mount_(computing))
    /// менеджер кластеров с диска `disk`.
    ///
    /// Если загрузочный сектор не содержит сигнатуры файловой системы,
    /// строит загрузочную запись по размеру диска.
    /// Возвращает ошибку [`Error::Medium`], если загрузочная запись
    /// не согласуется сама с собой или с размером диска.
    pub fn mount<D: BlockDevice>(disk: &D) -> Result<Self> {
        let sector_count = disk.sector_count()?;

        let mut buffer = ZERO_SECTOR;
        disk.read(BOOT_SECTOR, &mut buffer)?;
        let boot_record = BootRecord::decode(&buffer);

        let boot_record = if boot_record.has_magic() {
            boot_record.validate()?
        } else {
            warn!(sector_count, "no file system signature, synthesizing the boot record");
            BootRecord::new(sector_count)?
        };

        if boot_record.total_sectors() > sector_count {
            error!(
                total_sectors = boot_record.total_sectors(),
                sector_count,
                "the file system does not fit the disk",
            );
            return Err(Medium);
        }

        let table = FatTable::load(
            disk,
            boot_record.fat_start(),
            boot_record.total_sectors() - boot_record.data_start(),
        )?;
        let fat = Self::new(boot_record, table)?;

        info!(fat = ?fat, "mounted the file system");

        Ok(fat)
    }

    /// Форматирует диск `disk`: записывает новую загрузочную запись и пустую таблицу FAT,
    /// в которой занят только кластер корневой директории.
    /// Сам кластер корневой директории заполняется нулями.
    pub fn format<D: BlockDevice>(disk: &D) -> Result<Self> {
        let sector_count = disk.sector_count()?;
        let boot_record = BootRecord::new(sector_count)?;

        let mut table = FatTable::new(boot_record.total_sectors() - boot_record.data_start())?;
        let root = Cluster::new(boot_record.root_directory_cluster()).ok_or(Medium)?;
        table.set(root, Link::Terminator);

        let fat = Self::new(boot_record, table)?;

        disk.write(fat.cluster_to_sector(root), &ZERO_SECTOR)?;
        fat.flush(disk)?;

        let cluster_size = Size::bytes(CLUSTER_SIZE);
        let fat_size = fat.state.lock().table.size();
        let free_space = Size::bytes(fat.free_space());
        info!(
            %free_space,
            %cluster_size,
            sector_count,
            fat_start = boot_record.fat_start(),
            fat_sectors = boot_record.fat_sectors(),
            %fat_size,
            data_start = fat.data_start,
            fat_length = fat.fat_length,
            "formatted the file system",
        );

        Ok(fat)
    }

    /// Записывает загрузочную запись и таблицу FAT на диск `disk`.
    pub fn flush<D: BlockDevice>(
        &self,
        disk: &D,
    ) -> Result<()> {
        disk.write(BOOT_SECTOR, &self.boot_record.encode())?;

        self.state.lock().table.flush(
            disk,
            self.boot_record.fat_start(),
            self.boot_record.fat_sectors(),
        )
    }

    /// Выделяет свободный кластер с наименьшим номером и помечает его в битовой карте занятым.
    /// Запись кластера в таблице FAT не меняет.
    ///
    /// Возвращает ошибку [`Error::NoDisk`], если свободных кластеров нет.
    /// В этом случае битовая карта не меняется.
    pub fn allocate(&self) -> Result<Cluster> {
        self.state.lock().bitmap.allocate()
    }

    /// Записывает `link` в запись кластера `cluster` таблицы FAT.
    /// Если кластер был свободен, помечает его занятым.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если кластер `cluster` не принадлежит области данных.
    pub fn put(
        &self,
        cluster: Cluster,
        link: Link,
    ) -> Result<()> {
        self.check(cluster)?;
        self.state.lock().put(cluster, link);

        Ok(())
    }

    /// Возвращает запись кластера `cluster` таблицы FAT.
    /// Не проверяет, что кластер занят.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если кластер `cluster` не принадлежит области данных.
    pub fn get(
        &self,
        cluster: Cluster,
    ) -> Result<Link> {
        self.check(cluster)?;

        Ok(self.state.lock().table.get(cluster))
    }

    /// Занимает кластер `cluster` как цепочку из одного кластера, если он свободен.
    /// Возвращает `true`, если кластер был свободен.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если кластер `cluster` не принадлежит области данных.
    pub fn reserve(
        &self,
        cluster: Cluster,
    ) -> Result<bool> {
        self.check(cluster)?;

        let mut state = self.state.lock();
        let was_free = state.bitmap.is_free(cluster);
        if was_free {
            state.put(cluster, Link::Terminator);
            trace!(%cluster, free = state.bitmap.free_count(), "reserved a cluster");
        }

        Ok(was_free)
    }

    /// Выделяет новый кластер и делает его концом цепочки.
    /// Если задан `tail`, новый кластер подцепляется за ним.
    ///
    /// Возвращает ошибку [`Error::NoDisk`], если свободных кластеров нет.
    /// В этом случае цепочка не меняется.
    pub fn create_chain(
        &self,
        tail: Option<Cluster>,
    ) -> Result<Cluster> {
        if let Some(tail) = tail {
            self.check(tail)?;
        }

        let mut state = self.state.lock();

        let cluster = state.bitmap.allocate()?;
        state.put(cluster, Link::Terminator);
        if let Some(tail) = tail {
            state.put(tail, Link::Next(cluster));
        }

        trace!(%cluster, ?tail, free = state.bitmap.free_count(), "extended a chain");

        Ok(cluster)
    }

    /// Освобождает цепочку, начиная с кластера `cluster` и до её конца.
    /// Записи таблицы FAT освобождённых кластеров не меняются,
    /// сбрасываются только их биты в битовой карте.
    /// Если задан `previous`, он становится концом оставшейся цепочки.
    ///
    /// Возвращает количество освобождённых кластеров или
    /// ошибку [`Error::Medium`], если цепочка зациклена или ссылается
    /// за пределы области данных.
    /// В случае ошибки ни битовая карта, ни таблица не меняются.
    pub fn remove_chain(
        &self,
        cluster: Cluster,
        previous: Option<Cluster>,
    ) -> Result<usize> {
        self.check(cluster)?;
        if let Some(previous) = previous {
            self.check(previous)?;
        }

        let mut state = self.state.lock();

        let (_, length) = self.chain_end(&state, cluster)?;

        let mut freed = 0;
        let mut current = Some(cluster);
        for _ in 0 .. length {
            let Some(cluster) = current else {
                break;
            };

            if state.bitmap.set_free(cluster) {
                freed += 1;
            }

            current = self.next(&state, cluster)?;
        }

        if let Some(previous) = previous {
            state.put(previous, Link::Terminator);
        }

        trace!(%cluster, ?previous, freed, free = state.bitmap.free_count(), "removed a chain");

        Ok(freed)
    }

    /// Возвращает последний кластер цепочки, которая начинается с `start`,
    /// и количество кластеров в ней.
    ///
    /// Возвращает ошибку [`Error::Medium`], если цепочка зациклена
    /// или ссылается за пределы области данных.
    pub fn last(
        &self,
        start: Cluster,
    ) -> Result<(Cluster, usize)> {
        self.check(start)?;

        self.chain_end(&self.state.lock(), start)
    }

    /// Проходит `n` ссылок цепочки, начиная с кластера `start`.
    /// Возвращает [`None`], если цепочка закончилась раньше.
    ///
    /// Возвращает ошибку [`Error::Medium`], если цепочка зациклена
    /// или ссылается за пределы области данных.
    pub fn nth(
        &self,
        start: Cluster,
        n: usize,
    ) -> Result<Option<Cluster>> {
        self.check(start)?;

        if n >= self.fat_length {
            return self.last(start).and(Ok(None));
        }

        let state = self.state.lock();

        let mut current = start;
        for _ in 0 .. n {
            match self.next(&state, current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }

        Ok(Some(current))
    }

    /// Номер первого сектора кластера `cluster`.
    pub fn cluster_to_sector(
        &self,
        cluster: Cluster,
    ) -> usize {
        self.data_start + cluster.index() * SECTORS_PER_CLUSTER
    }

    /// Номер кластера, которому принадлежит сектор `sector`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если сектор не принадлежит области данных.
    pub fn sector_to_cluster(
        &self,
        sector: usize,
    ) -> Result<Cluster> {
        let index = sector.checked_sub(self.data_start).ok_or(InvalidArgument)? /
            SECTORS_PER_CLUSTER;

        if index < self.fat_length {
            Cluster::from_index(index)
        } else {
            Err(InvalidArgument)
        }
    }

    /// Возвращает `true`, если кластер `cluster` свободен по битовой карте.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если кластер `cluster` не принадлежит области данных.
    pub fn is_free(
        &self,
        cluster: Cluster,
    ) -> Result<bool> {
        self.check(cluster)?;

        Ok(self.state.lock().bitmap.is_free(cluster))
    }

    /// Количество свободных кластеров.
    pub fn free_count(&self) -> usize {
        self.state.lock().bitmap.free_count()
    }

    /// Объём свободного места в байтах.
    pub fn free_space(&self) -> usize {
        self.free_count() * CLUSTER_SIZE
    }

    /// Количество кластеров в области данных.
    pub fn cluster_count(&self) -> usize {
        self.fat_length
    }

    /// Загрузочная запись.
    pub fn boot_record(&self) -> &BootRecord {
        &self.boot_record
    }

    /// Первый сектор области данных.
    pub fn data_start(&self) -> usize {
        self.data_start
    }

    /// Количество записей таблицы FAT.
    pub fn fat_length(&self) -> usize {
        self.fat_length
    }

    /// Номер последнего сектора диска.
    pub fn last_cluster(&self) -> usize {
        self.last_cluster
    }

    /// Собирает [`Fat`] из загрузочной записи и таблицы,
    /// восстанавливая по таблице битовую карту кластеров.
    fn new(
        boot_record: BootRecord,
        table: FatTable,
    ) -> Result<Self> {
        let bitmap = ClusterBitmap::rebuild(&table);
        bitmap.validate()?;

        Ok(Self {
            boot_record,
            data_start: boot_record.data_start(),
            fat_length: table.len(),
            last_cluster: boot_record.total_sectors() - 1,
            state: Spinlock::new(State { bitmap, table }),
        })
    }

    /// Проверяет, что кластер `cluster` принадлежит области данных.
    fn check(
        &self,
        cluster: Cluster,
    ) -> Result<()> {
        if cluster.index() < self.fat_length {
            Ok(())
        } else {
            Err(InvalidArgument)
        }
    }

    /// Возвращает кластер, следующий в цепочке за `cluster`.
    /// Свободная запись, как и конец цепочки, обрывает цепочку.
    fn next(
        &self,
        state: &State,
        cluster: Cluster,
    ) -> Result<Option<Cluster>> {
        match state.table.get(cluster) {
            Link::Next(next) if self.check(next).is_ok() => Ok(Some(next)),
            Link::Next(next) => {
                error!(%cluster, %next, "cluster chain points outside of the data region");
                Err(Medium)
            },
            Link::Free | Link::Terminator => Ok(None),
        }
    }

    /// Проходит цепочку от `start` до конца, не больше [`Fat::fat_length`] ссылок.
    /// Возвращает её последний кластер и количество кластеров в ней.
    fn chain_end(
        &self,
        state: &State,
        start: Cluster,
    ) -> Result<(Cluster, usize)> {
        let mut current = start;
        for length in 1 ..= self.fat_length {
            match self.next(state, current)? {
                Some(next) => current = next,
                None => return Ok((current, length)),
            }
        }

        error!(%start, fat_length = self.fat_length, "cluster chain is looped");

        Err(Medium)
    }
}

impl fmt::Debug for Fat {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ data_start: {}, fat_length: {}, last_cluster: {}, free: {}, boot_record: {:?} }}",
            self.data_start,
            self.fat_length,
            self.last_cluster,
            Size::bytes(self.free_space()),
            self.boot_record,
        )
    }
}

/// Изменяемая часть [`Fat`], защищённая блокировкой.
struct State {
    /// Битовая карта свободных кластеров.
    bitmap: ClusterBitmap,

    /// Таблица FAT.
    table: FatTable,
}

impl State {
    /// Записывает `link` в запись кластера `cluster` и помечает его занятым.
    /// Единственный путь, которым кластер становится занятым вне [`ClusterBitmap::allocate()`].
    fn put(
        &mut self,
        cluster: Cluster,
        link: Link,
    ) {
        self.bitmap.set_used(cluster);
        self.table.set(cluster, link);
    }
}
