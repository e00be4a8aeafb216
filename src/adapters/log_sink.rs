//! Log-only notification adapters.
//!
//! Implement [`Notifier`] and [`AudioPlayer`] by writing to the `log`
//! facade.  Used by the bench binary when no push gateway or speaker is
//! configured; a real gateway implements the same traits.

use log::info;

use crate::app::ports::{AudioPlayer, Notifier};
use crate::error::NotifyError;

#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str, image: Option<&[u8]>) -> Result<(), NotifyError> {
        match image {
            Some(bytes) => info!("NOTIFY | {message} | image {} bytes", bytes.len()),
            None => info!("NOTIFY | {message}"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct LogAudio;

impl AudioPlayer for LogAudio {
    fn play(&self, clip: &str) -> Result<(), NotifyError> {
        info!("AUDIO | play {clip}");
        Ok(())
    }
}
