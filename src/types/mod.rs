//! Data model for assets, parts, and multipart upload targets.

pub mod asset;
pub mod multipart;

pub use asset::{Asset, AssetMetadata, AssetVersion, TransferAsset, VersionOptions};
pub use multipart::{MultipartTarget, TransferPart};
