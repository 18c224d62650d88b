//! Photodrop Processing Library
//!
//! Downloads chat attachments, converts HEIC/HEIF images to JPEG and uploads
//! the result into the thread's remote folder.

pub mod pipeline;
pub mod source;
pub mod transcode;
pub mod upload;

// Re-export commonly used types
pub use pipeline::{FetchAndStore, MediaJob, PipelineSettings, VideoRoute};
pub use source::{ByteStream, HttpSource, MediaSource};
pub use transcode::{
    default_decoder, transcode_legacy_image, ImageCrateDecoder, LegacyImageDecoder, Transcoded,
    HEIF_SUPPORT,
};
pub use upload::{mime_type, remote_file_name, UploadJob, Uploader};
