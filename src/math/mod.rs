pub mod init;
pub mod tensor;

pub use tensor::{ImageTensor, Shape, Tensor3};
