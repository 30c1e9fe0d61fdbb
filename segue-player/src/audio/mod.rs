//! Audio data boundary: formats, decoders and output devices

pub mod decoder;
pub mod device;
pub mod format;
pub mod generator;

pub use decoder::{Decoder, DecoderFactory, DecoderHandle, ProgramSource};
pub use device::{DeviceQuery, OutputDevice, StaticDevices};
pub use format::{ProcessingFormat, SampleEncoding};
pub use generator::ToneDecoder;
