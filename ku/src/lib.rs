//! Общая библиотека для слоёв хранения учебной операционной системы.
//! ku --- **k**ernel && **u**ser.

#![no_std]
#![warn(clippy::missing_docs_in_private_items)]
#![warn(missing_docs)]

extern crate alloc;

/// Коллекции элементов.
pub mod collections;

/// Перечисление для возможных ошибок [`Error`] и соответствующий [`Result`].
pub mod error;

/// Поддержка журналирования макросами библиотеки [`tracing`].
pub mod log;

/// Базовые примитивы для работы с размерами областей памяти и диска.
pub mod memory;

/// Примитив синхронизации [`Spinlock`].
pub mod sync;

pub use error::{
    Error,
    Result,
};
pub use sync::spinlock::Spinlock;
