#![doc = "convert-email-core: core pipeline library for convert-email."]

//! This crate contains the batch conversion-and-upload pipeline and the
//! interfaces of the collaborators it drives (identity service, share-link
//! downloader, conversion tool, document host).
//! The DocumentCloud API client lives in the `convert-email` binary crate.
//!
//! # Usage
//! Build a [`config::RunConfig`], wire up a [`contract::Collaborators`] and
//! call [`pipeline::run`].

pub mod attachments;
pub mod config;
pub mod contract;
pub mod convert;
pub mod download;
pub mod error;
pub mod permissions;
pub mod pipeline;
pub mod report;
pub mod staging;
