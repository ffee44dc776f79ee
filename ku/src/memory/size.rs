use core::{
    fmt,
    mem,
};

use number_prefix::NumberPrefix;
use static_assertions::const_assert;

use crate::error::{
    Error,
    Result,
};

// Поля дисковых структур --- u32, и любое из них представимо в usize.
const_assert!(mem::size_of::<u32>() <= mem::size_of::<usize>());

/// Преобразует поле дисковой структуры в [`usize`] без потерь.
pub const fn from(x: u32) -> usize {
    x as usize
}

/// Преобразует [`usize`] в целый тип `T`, например в поле дисковой структуры типа [`u32`].
/// Возвращает ошибку [`Error::Int`], если значение `x` не помещается в `T`.
pub fn try_into<T: TryFrom<usize>>(x: usize) -> Result<T>
where
    Error: From<<T as TryFrom<usize>>::Error>,
{
    Ok(T::try_from(x)?)
}

/// Размер области диска или памяти в байтах, который печатается
/// с [двоичной приставкой](https://en.wikipedia.org/wiki/Binary_prefix).
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Size(usize);

impl Size {
    /// Размер области в `bytes` байт.
    pub const fn bytes(bytes: usize) -> Self {
        Self(bytes)
    }

    /// Размер, который занимает срез `slice`.
    pub const fn from_slice<T>(slice: &[T]) -> Self {
        Self(mem::size_of_val(slice))
    }

    /// Размер в байтах.
    pub const fn num_bytes(&self) -> usize {
        self.0
    }
}

impl fmt::Display for Size {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        match NumberPrefix::binary(self.0 as f64) {
            NumberPrefix::Standalone(_) => write!(formatter, "{} B", self.0),
            NumberPrefix::Prefixed(prefix, value) => {
                write!(formatter, "{:.3} {}B", value, prefix.symbol())
            },
        }
    }
}
