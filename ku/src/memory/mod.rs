/// Размер области диска или памяти [`Size`]
/// и преобразования между полями дисковых структур и [`usize`].
pub mod size;

pub use size::Size;
