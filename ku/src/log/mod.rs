//! Журналирование делегируется библиотеке [`tracing`].
//! Подписчик, который печатает сообщения, устанавливает тот, кто использует библиотеку:
//! ядро или тесты.

pub use tracing::{
    Level,
    debug,
    enabled,
    error,
    event,
    info,
    trace,
    warn,
};
