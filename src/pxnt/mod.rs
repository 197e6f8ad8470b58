//! The PXNT binary container codec (C2, §4.2, §6.2): header/footer framing,
//! category definitions, optional metadata, and the reader/writer pair that
//! turn a [`crate::page::Page`] into bytes and back.

pub mod category;
pub mod header;
pub mod metadata;
pub mod reader;
pub mod writer;

pub use header::{Compression, Flags, Footer, Header};
pub use reader::{PxntReader, PxntSection};
pub use writer::PxntWriter;
