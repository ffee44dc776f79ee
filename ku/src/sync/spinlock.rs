use core::{
    fmt,
    ops::{
        Deref,
        DerefMut,
    },
};

/// Спин-блокировка, которая позволяет синхронизировать доступ
/// к защищаемым ею данным из разных потоков исполнения.
///
/// <https://en.wikipedia.org/wiki/Spinlock>
///
/// # Examples
///
/// ## Захват спин-блокировки, использование защищаемых данных и неявное освобождение спин-блокировки
/// ```rust
/// # use ku::sync::spinlock::Spinlock;
/// #
/// // Инициализация спин-блокировки с одновременной инициализацией защищаемых ею данных.
/// let spinlock: Spinlock<i32> = Spinlock::new(42);
///
/// {
///     // Захват спин-блокировки, который возвращает объект типа SpinlockGuard.
///     let mut lock = spinlock.lock();
///
///     // Через этот объект можно получить доступ к защищаемым данным.
///     *lock += 1;
///
///     // При завершении области видимости переменной lock типа SpinlockGuard
///     // происходит неявное освобождение спин-блокировки.
/// }
/// #
/// # assert!(spinlock.try_lock().is_some());
/// ```
///
/// ## Попытка захвата блокировки
/// ```rust
/// # use ku::sync::spinlock::Spinlock;
/// #
/// let spinlock: Spinlock<i32> = Spinlock::new(42);
///
/// if let Some(mut lock) = spinlock.try_lock() {
///     *lock += 1;
///
///     // Повторная попытка захвата спин-блокировки обречена на провал.
///     assert!(spinlock.try_lock().is_none());
/// }
/// #
/// # assert_eq!(*spinlock.lock(), 43);
/// ```
pub struct Spinlock<T> {
    /// Данные, защищаемые спин-блокировкой.
    data: spin::Mutex<T>,
}

impl<T> Spinlock<T> {
    /// Создаёт новую спин-блокировку для защиты `data`.
    pub const fn new(data: T) -> Self {
        Self {
            data: spin::Mutex::new(data),
        }
    }

    /// Захватывает спин-блокировку.
    /// При этом ожидает в активном цикле освобождения блокировки, если она уже захвачена.
    ///
    /// Возвращает [`SpinlockGuard`], который:
    ///   - Позволяет читать и писать в защищаемые [`Spinlock`] данные
    ///     с помощью типажей [`Deref`] и [`DerefMut`] соответственно.
    ///   - Автоматически освобождает блокировку в реализации типажа [`Drop`].
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        SpinlockGuard {
            spinlock: self.data.lock(),
        }
    }

    /// Пытается захватить спин-блокировку.
    /// Если она уже захвачена, возвращает [`None`].
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        Some(SpinlockGuard {
            spinlock: self.data.try_lock()?,
        })
    }

    /// Позволяет читать и писать в защищаемые [`Spinlock`] данные без блокирования в случае,
    /// если вызывающий код эксклюзивно владеет [`Spinlock`] --- `&mut self`.
    /// То есть, в случае когда конкурентного доступа к [`Spinlock`] быть не может.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    /// Забирает защищаемые данные, уничтожая саму блокировку.
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: fmt::Debug> fmt::Debug for Spinlock<T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{:?}", self.data)
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for Spinlock<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

/// Захваченный на запись [`Spinlock`].
///
/// - Позволяет читать и писать в защищаемые [`Spinlock`] данные
///   с помощью типажей [`Deref`] и [`DerefMut`] соответственно.
/// - Автоматически освобождает блокировку в реализации типажа [`Drop`].
pub struct SpinlockGuard<'a, T> {
    /// Захваченный на запись [`Spinlock`].
    spinlock: spin::MutexGuard<'a, T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.spinlock.deref()
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.spinlock.deref_mut()
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinlockGuard<'_, T> {
    fn fmt(
        &self,
        formatter: &mut fmt::Formatter,
    ) -> fmt::Result {
        write!(formatter, "{:?}", self.deref())
    }
}
