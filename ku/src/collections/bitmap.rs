use alloc::{
    vec,
    vec::Vec,
};
use core::fmt;

use crate::error::{
    Error::InvalidArgument,
    Result,
};

// Used in docs.
#[allow(unused)]
use crate::error::Error;

/// [Битовая карта](https://en.wikipedia.org/wiki/Free-space_bitmap)
/// фиксированного размера
/// для отслеживания какие именно элементы заняты, а какие --- свободны.
///
/// Выделение всегда возвращает свободный элемент с наименьшим номером.
#[derive(Clone, Eq, PartialEq)]
pub struct Bitmap {
    /// [Битовая карта](https://en.wikipedia.org/wiki/Free-space_bitmap),
    /// каждый элемент этого вектора отвечает за [`Self::BITS_PER_ENTRY`] элементов.
    /// Биты за пределами [`Bitmap::len`] всегда сброшены.
    bitmap: Vec<u64>,

    /// Количество свободных элементов.
    free: usize,

    /// Количество элементов.
    len: usize,
}

impl Bitmap {
    /// Создаёт битовую карту на `len` элементов, все из которых свободны.
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; len.div_ceil(Self::BITS_PER_ENTRY)],
            free: len,
            len,
        }
    }

    /// Возвращает количество свободных элементов.
    pub fn free(&self) -> usize {
        self.free
    }

    /// Возвращает полное количество элементов.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Возвращает `true`, если битовая карта пуста, то есть [`Bitmap::len()`] равно нулю.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Возвращает `true`, если элемент `number` свободен.
    ///
    /// # Panics
    ///
    /// Паникует, если:
    ///   - Значение `number` больше или равно размеру --- [`Bitmap::len()`].
    pub fn is_free(
        &self,
        number: usize,
    ) -> bool {
        assert!(number < self.len());
        !Self::bit(&self.bitmap, number)
    }

    /// Помечает элемент `number` как свободный.
    ///
    /// # Panics
    ///
    /// Паникует, если:
    ///   - Значение `number` больше или равно размеру --- [`Bitmap::len()`].
    ///   - Элемент `number` уже помечен как свободный.
    pub fn set_free(
        &mut self,
        number: usize,
    ) {
        assert!(!self.is_free(number));
        self.bitmap[number / Self::BITS_PER_ENTRY] &= !Self::mask(number);
        self.free += 1;
    }

    /// Помечает элемент `number` как занятый.
    ///
    /// # Panics
    ///
    /// Паникует, если:
    ///   - Значение `number` больше или равно размеру --- [`Bitmap::len()`].
    ///   - Элемент `number` уже помечен как занятый.
    pub fn set_used(
        &mut self,
        number: usize,
    ) {
        assert!(self.is_free(number));
        self.bitmap[number / Self::BITS_PER_ENTRY] |= Self::mask(number);
        self.free -= 1;
    }

    /// Находит в битовой карте свободный элемент с наименьшим номером и помечает его занятым.
    /// Возвращает номер выделенного элемента или [`None`], если свободных элементов не осталось.
    /// Во втором случае битовая карта не меняется.
    pub fn allocate(&mut self) -> Option<usize> {
        if self.free == 0 {
            return None;
        }

        for (index, entry) in self.bitmap.iter_mut().enumerate() {
            if *entry != u64::MAX {
                let bit = entry.trailing_ones() as usize;
                let number = index * Self::BITS_PER_ENTRY + bit;
                if number >= self.len {
                    break;
                }

                *entry |= 1 << bit;
                self.free -= 1;

                return Some(number);
            }
        }

        None
    }

    /// Проверяет корректность поля [`Bitmap::free`].
    ///
    /// Возвращает ошибку:
    ///   - [`Error::InvalidArgument`] если количество свободных битов в
    ///     [`Bitmap::bitmap`] не совпадает с [`Bitmap::free`].
    pub fn validate(&self) -> Result<()> {
        if self.free == Self::count_free(&self.bitmap, self.len) {
            Ok(())
        } else {
            Err(InvalidArgument)
        }
    }

    /// Вычисляет количество свободных элементов среди первых `len` элементов `bitmap`.
    ///
    /// # Panics
    ///
    /// Паникует, если:
    ///   - Срез `bitmap` содержит недостаточно позиций для хранения `len` бит.
    fn count_free(
        bitmap: &[u64],
        len: usize,
    ) -> usize {
        assert!(len.div_ceil(Self::BITS_PER_ENTRY) <= bitmap.len());

        let full_elements_count = len / Self::BITS_PER_ENTRY;
        let full_elements_free_count = bitmap[.. full_elements_count]
            .iter()
            .map(|entry| entry.count_zeros() as usize)
            .sum::<usize>();

        let last_element_free_count = (full_elements_count * Self::BITS_PER_ENTRY .. len)
            .filter(|&number| !Self::bit(bitmap, number))
            .count();

        full_elements_free_count + last_element_free_count
    }

    /// Возвращает `true` если в битовой карте `bitmap` установлен бит номер `number`.
    fn bit(
        bitmap: &[u64],
        number: usize,
    ) -> bool {
        bitmap[number / Self::BITS_PER_ENTRY] & Self::mask(number) != 0
    }

    /// Маска бита номер `number` внутри его элемента битовой карты.
    fn mask(number: usize) -> u64 {
        1 << (number % Self::BITS_PER_ENTRY)
    }

    /// Количество элементов, за которые отвечает один элемент вектора [`Bitmap::bitmap`].
    pub const BITS_PER_ENTRY: usize = u64::BITS as usize;
}

impl fmt::Debug for Bitmap {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(
            formatter,
            "{{ free: {}, len: {} }}",
            self.free,
            self.len,
        )
    }
}
