pub mod body;
pub mod multipart;
