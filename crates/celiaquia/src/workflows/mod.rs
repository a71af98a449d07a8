pub mod expediente;
pub mod importador;
