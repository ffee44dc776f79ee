use core::num::NonZeroU32;

use derive_more::Display;

use ku::{
    error::{
        Error::InvalidArgument,
        Result,
    },
    memory::size,
};

// Used in docs.
#[allow(unused)]
use ku::error::Error;

/// Номер кластера.
///
/// Кластеры нумеруются с единицы.
/// Нулевой кластер означает отсутствие кластера и типом [`Cluster`] не представим,
/// вместо него используется [`None`] или ошибка.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Cluster(NonZeroU32);

impl Cluster {
    /// Возвращает кластер номер `number` или [`None`], если `number` равен нулю.
    pub const fn new(number: u32) -> Option<Self> {
        match NonZeroU32::new(number) {
            Some(number) => Some(Self(number)),
            None => None,
        }
    }

    /// Номер кластера.
    pub const fn get(self) -> u32 {
        self.0.get()
    }

    /// Индекс записи кластера в таблице FAT и бита в битовой карте кластеров.
    pub(crate) fn index(self) -> usize {
        size::from(self.get() - 1)
    }

    /// Кластер, которому соответствует запись таблицы FAT номер `index`.
    ///
    /// Возвращает ошибку [`Error::InvalidArgument`],
    /// если такой кластер не представим в формате таблицы.
    pub(crate) fn from_index(index: usize) -> Result<Self> {
        let number = size::try_into::<u32>(index)?.checked_add(1).ok_or(InvalidArgument)?;
        if number == TERMINATOR {
            return Err(InvalidArgument);
        }

        Self::new(number).ok_or(InvalidArgument)
    }
}

/// Значение записи таблицы FAT.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Link {
    /// Кластер не входит ни в одну цепочку.
    /// Так же выглядит и никогда не записанная запись таблицы.
    #[default]
    Free,

    /// Последний кластер цепочки.
    Terminator,

    /// Следующий кластер цепочки.
    Next(Cluster),
}

impl Link {
    /// Декодирует запись таблицы FAT в том виде, в котором она хранится на диске.
    pub(crate) fn from_raw(raw: u32) -> Self {
        match raw {
            FREE => Self::Free,
            TERMINATOR => Self::Terminator,
            next => Cluster::new(next).map_or(Self::Free, Self::Next),
        }
    }

    /// Кодирует запись таблицы FAT в том виде, в котором она хранится на диске.
    pub(crate) fn into_raw(self) -> u32 {
        match self {
            Self::Free => FREE,
            Self::Terminator => TERMINATOR,
            Self::Next(next) => next.get(),
        }
    }

    /// Возвращает `true`, если запись не входит ни в одну цепочку.
    pub fn is_free(&self) -> bool {
        *self == Self::Free
    }
}

/// Значение свободной записи таблицы FAT.
const FREE: u32 = 0;

/// Значение записи таблицы FAT, которое обозначает конец цепочки
/// ([End Of Chain](https://en.wikipedia.org/wiki/Design_of_the_FAT_file_system#Cluster_values)).
pub(crate) const TERMINATOR: u32 = 0x0FFF_FFFF;

#[cfg(test)]
mod test {
    use super::{
        Cluster,
        Link,
        TERMINATOR,
    };

    #[test]
    fn raw_links() {
        assert_eq!(Link::from_raw(0), Link::Free);
        assert_eq!(Link::from_raw(TERMINATOR), Link::Terminator);
        assert_eq!(Link::from_raw(7), Link::Next(Cluster::new(7).unwrap()));

        for link in [
            Link::Free,
            Link::Terminator,
            Link::Next(Cluster::new(1).unwrap()),
        ] {
            assert_eq!(Link::from_raw(link.into_raw()), link);
        }
    }

    #[test]
    fn index() {
        assert!(Cluster::new(0).is_none());

        let first = Cluster::new(1).unwrap();
        assert_eq!(first.index(), 0);
        assert_eq!(Cluster::from_index(0), Ok(first));
        assert!(Cluster::from_index(usize::try_from(TERMINATOR).unwrap() - 1).is_err());
    }
}
