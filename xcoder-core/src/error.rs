//! Fatal, run-aborting error kinds.
//!
//! Per-attempt failures (one (encoder, decode_mode) attempt failing) are not
//! modelled as [`Error`] variants: they never escape the scheduler, they are
//! plain strings accumulated on a [`crate::task::Task`]. Only conditions
//! that prevent the batch runner from starting, or that corrupt an
//! otherwise-successful conversion, are errors here.

use std::{io, sync};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
  #[error("io error: {0}")]
  Io(#[from] io::Error),

  #[error("could not parse configuration file: {0}")]
  ConfigParse(#[from] toml::de::Error),

  #[error("configuration is invalid: {0}")]
  InvalidConfig(String),

  #[error("no encoders are enabled after probing; nothing to do")]
  NoEncodersEnabled,

  #[error("external tool {0:?} could not be started: {1}")]
  ToolUnavailable(String, io::Error),

  #[error("rename from temp path {tmp:?} to final path {dest:?} failed: {source}")]
  Rename {
    tmp: std::path::PathBuf,
    dest: std::path::PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("mutex poisoned")]
  MutexPoison,
}

impl<T> From<sync::PoisonError<T>> for Error {
  fn from(_: sync::PoisonError<T>) -> Error {
    Error::MutexPoison
  }
}
