/// Примитив синхронизации [`Spinlock`].
pub mod spinlock;

pub use spinlock::{
    Spinlock,
    SpinlockGuard,
};
