use ku::{
    collections,
    error::{
        Error::{
            Medium,
            NoDisk,
        },
        Result,
    },
};

use super::{
    cluster::Cluster,
    table::FatTable,
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// [Битовая карта](https://en.wikipedia.org/wiki/Free-space_bitmap)
/// для отслеживания какие именно кластеры файловой системы заняты, а какие --- свободны.
///
/// Бит кластера `cluster` хранится под номером `cluster - 1`.
/// Бит установлен тогда и только тогда, когда запись кластера в таблице FAT
/// считается ненулевой.
#[derive(Debug)]
pub(super) struct ClusterBitmap {
    /// Битовая карта, по одному биту на кластер.
    bitmap: collections::Bitmap,
}

impl ClusterBitmap {
    /// Создаёт битовую карту на `cluster_count` кластеров, все из которых свободны.
    pub(super) fn new(cluster_count: usize) -> Self {
        Self {
            bitmap: collections::Bitmap::new(cluster_count),
        }
    }

    /// Восстанавливает битовую карту по таблице FAT `table`:
    /// кластер занят, если его запись в таблице ненулевая.
    pub(super) fn rebuild(table: &FatTable) -> Self {
        let mut bitmap = Self::new(table.len());

        for index in (0 .. table.len()).filter(|&index| table.raw(index) != 0) {
            bitmap.bitmap.set_used(index);
        }

        bitmap
    }

    /// Возвращает `true`, если кластер `cluster` свободен.
    ///
    /// # Panics
    ///
    /// Паникует, если `cluster` выходит за пределы файловой системы.
    pub(super) fn is_free(
        &self,
        cluster: Cluster,
    ) -> bool {
        self.bitmap.is_free(cluster.index())
    }

    /// Помечает кластер `cluster` как занятый, если он ещё не занят.
    ///
    /// # Panics
    ///
    /// Паникует, если `cluster` выходит за пределы файловой системы.
    pub(super) fn set_used(
        &mut self,
        cluster: Cluster,
    ) {
        if self.is_free(cluster) {
            self.bitmap.set_used(cluster.index());
        }
    }

    /// Помечает кластер `cluster` как свободный.
    /// Возвращает `false`, если он уже был свободен.
    ///
    /// # Panics
    ///
    /// Паникует, если `cluster` выходит за пределы файловой системы.
    pub(super) fn set_free(
        &mut self,
        cluster: Cluster,
    ) -> bool {
        let was_used = !self.is_free(cluster);
        if was_used {
            self.bitmap.set_free(cluster.index());
        }

        was_used
    }

    /// Находит свободный кластер с наименьшим номером и помечает его занятым.
    /// Возвращает ошибку [`Error::NoDisk`], если свободных кластеров не осталось.
    /// В этом случае битовая карта не меняется.
    pub(super) fn allocate(&mut self) -> Result<Cluster> {
        let index = self.bitmap.allocate().ok_or(NoDisk)?;

        Cluster::from_index(index).map_err(|_| Medium)
    }

    /// Количество свободных кластеров.
    pub(super) fn free_count(&self) -> usize {
        self.bitmap.free()
    }

    /// Полное количество кластеров.
    pub(super) fn len(&self) -> usize {
        self.bitmap.len()
    }

    /// Проверяет, что счётчик свободных кластеров согласован с самими битами.
    pub(super) fn validate(&self) -> Result<()> {
        self.bitmap.validate().map_err(|_| Medium)
    }
}

#[doc(hidden)]
pub mod test_scaffolding {
    use ku::error::Result;

    use super::super::Cluster;

    #[derive(Debug)]
    pub struct ClusterBitmap(super::ClusterBitmap);

    impl ClusterBitmap {
        pub fn new(cluster_count: usize) -> Self {
            Self(super::ClusterBitmap::new(cluster_count))
        }

        pub fn is_free(
            &self,
            cluster: Cluster,
        ) -> bool {
            self.0.is_free(cluster)
        }

        pub fn set_used(
            &mut self,
            cluster: Cluster,
        ) {
            self.0.set_used(cluster)
        }

        pub fn set_free(
            &mut self,
            cluster: Cluster,
        ) -> bool {
            self.0.set_free(cluster)
        }

        pub fn allocate(&mut self) -> Result<Cluster> {
            self.0.allocate()
        }

        pub fn free_count(&self) -> usize {
            self.0.free_count()
        }

        pub fn len(&self) -> usize {
            self.0.len()
        }

        pub fn is_empty(&self) -> bool {
            self.0.len() == 0
        }

        pub fn validate(&self) -> Result<()> {
            self.0.validate()
        }
    }
}
