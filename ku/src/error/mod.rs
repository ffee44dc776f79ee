use core::{
    array::TryFromSliceError,
    num::TryFromIntError,
    result,
};

/// Перечисление для возможных ошибок.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Error {
    /// Заданное целое значение не помещается в указанный тип.
    Int(TryFromIntError),

    /// Задано недопустимое значение аргумента.
    InvalidArgument,

    /// Ошибка на устройстве хранения данных
    /// или повреждённые метаданные файловой системы на нём.
    Medium,

    /// Нет свободного места на устройстве хранения данных.
    NoDisk,

    /// Не удалось выделить память под рабочий буфер.
    NoMemory,

    /// Возникло переполнение.
    Overflow,
}

impl From<TryFromIntError> for Error {
    fn from(e: TryFromIntError) -> Self {
        Error::Int(e)
    }
}

impl From<TryFromSliceError> for Error {
    fn from(_e: TryFromSliceError) -> Self {
        Error::InvalidArgument
    }
}

/// Тип возвращаемого результата `T` или ошибки [`Error`] ---
/// мономорфизация [`result::Result`] по типу ошибки.
pub type Result<T> = result::Result<T, Error>;
