//! Contactless (ISO 14443) card backend.
//!
//! The radio stack lives outside this crate. Platform glue hands over a
//! connected tag through [`ProximityTag`]; this module adds the card
//! semantics a VPCD reader expects.

use std::time::Duration;

use tracing::{debug, info};

use crate::atr::{synthesize_atr, type_b_historical_bytes};
use crate::backend::CardBackend;
use crate::error::{BackendError, Result};

/// `SELECT MF`, used in place of an electrical reset.
pub const SELECT_MF: [u8; 4] = [0x00, 0xA4, 0x00, 0x0C];

/// Transceive timeout applied when the tag is opened.
pub const DEFAULT_TRANSCEIVE_TIMEOUT: Duration = Duration::from_millis(500);

/// ISO 14443-B activation data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeBInfo {
    pub application_data: Vec<u8>,
    pub protocol_info: Vec<u8>,
}

/// A connected ISO-DEP tag as exposed by the platform.
pub trait ProximityTag: Send {
    /// Exchange one APDU with the tag.
    fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;

    /// Historical bytes from the ATS (Type A), if any.
    fn historical_bytes(&self) -> Option<Vec<u8>>;

    /// ATQB data (Type B), if the tag is a Type B card.
    fn type_b_info(&self) -> Option<TypeBInfo>;

    /// Largest APDU the platform can send in one transceive.
    fn max_transceive_len(&self) -> usize;

    /// Apply a transceive timeout.
    fn set_timeout(&mut self, timeout: Duration) -> Result<()>;

    /// Release the tag.
    fn close(&mut self) -> Result<()>;
}

/// [`CardBackend`] over a [`ProximityTag`].
///
/// There is no power or reset primitive on a contactless link:
/// `power_on` does nothing because the tag is already connected, and both
/// `power_off` and `reset` re-select the master file instead.
pub struct ProximityBackend<T> {
    tag: T,
    closed: bool,
}

impl<T: ProximityTag> ProximityBackend<T> {
    /// Take ownership of a connected tag with the default timeout.
    pub fn open(tag: T) -> Result<Self> {
        Self::with_timeout(tag, DEFAULT_TRANSCEIVE_TIMEOUT)
    }

    /// Take ownership of a connected tag with an explicit transceive timeout.
    pub fn with_timeout(mut tag: T, timeout: Duration) -> Result<Self> {
        tag.set_timeout(timeout)?;
        info!(timeout_ms = timeout.as_millis() as u64, "proximity card ready");
        Ok(Self { tag, closed: false })
    }

    /// Borrow the underlying tag.
    pub fn tag(&self) -> &T {
        &self.tag
    }

    fn historical_bytes(&self) -> Vec<u8> {
        if let Some(bytes) = self.tag.historical_bytes() {
            return bytes;
        }
        self.tag
            .type_b_info()
            .and_then(|info| {
                type_b_historical_bytes(
                    &info.application_data,
                    &info.protocol_info,
                    self.tag.max_transceive_len(),
                )
            })
            .map(|bytes| bytes.to_vec())
            .unwrap_or_default()
    }

    fn select_mf(&mut self) -> Result<()> {
        self.ensure_open()?;
        let response = self.tag.transceive(&SELECT_MF)?;
        debug!(
            response = %hex::encode(&response),
            "re-selected the master file in place of a reset"
        );
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BackendError::Ejected);
        }
        Ok(())
    }
}

impl<T: ProximityTag> CardBackend for ProximityBackend<T> {
    fn name(&self) -> &'static str {
        "proximity"
    }

    fn power_on(&mut self) -> Result<()> {
        self.ensure_open()
    }

    fn power_off(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.select_mf()
    }

    fn reset(&mut self) -> Result<()> {
        self.select_mf()
    }

    fn atr(&mut self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        Ok(synthesize_atr(&self.historical_bytes()))
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.ensure_open()?;
        self.tag.transceive(apdu)
    }

    fn eject(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tag.close()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default, Clone)]
    struct MockTag {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        closes: Arc<Mutex<usize>>,
        timeout: Arc<Mutex<Option<Duration>>>,
        historical: Option<Vec<u8>>,
        type_b: Option<TypeBInfo>,
    }

    impl ProximityTag for MockTag {
        fn transceive(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
            self.sent.lock().unwrap().push(apdu.to_vec());
            Ok(vec![0x90, 0x00])
        }

        fn historical_bytes(&self) -> Option<Vec<u8>> {
            self.historical.clone()
        }

        fn type_b_info(&self) -> Option<TypeBInfo> {
            self.type_b.clone()
        }

        fn max_transceive_len(&self) -> usize {
            251
        }

        fn set_timeout(&mut self, timeout: Duration) -> Result<()> {
            *self.timeout.lock().unwrap() = Some(timeout);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            *self.closes.lock().unwrap() += 1;
            Ok(())
        }
    }

    #[test]
    fn open_applies_default_timeout() {
        let tag = MockTag::default();
        let timeout = Arc::clone(&tag.timeout);

        let _backend = ProximityBackend::open(tag).unwrap();
        assert_eq!(*timeout.lock().unwrap(), Some(DEFAULT_TRANSCEIVE_TIMEOUT));
    }

    #[test]
    fn reset_and_power_off_select_mf() {
        let tag = MockTag::default();
        let sent = Arc::clone(&tag.sent);
        let mut backend = ProximityBackend::open(tag).unwrap();

        backend.power_on().unwrap();
        backend.reset().unwrap();
        backend.power_off().unwrap();

        assert_eq!(*sent.lock().unwrap(), vec![SELECT_MF.to_vec(), SELECT_MF.to_vec()]);
    }

    #[test]
    fn transmit_forwards_to_tag() {
        let tag = MockTag::default();
        let sent = Arc::clone(&tag.sent);
        let mut backend = ProximityBackend::open(tag).unwrap();

        let response = backend.transmit(&[0x00, 0xB0, 0x00, 0x00, 0x02]).unwrap();
        assert_eq!(response, vec![0x90, 0x00]);
        assert_eq!(sent.lock().unwrap()[0], vec![0x00, 0xB0, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn atr_uses_type_a_historical_bytes() {
        let tag = MockTag {
            historical: Some(vec![0x80, 0x73]),
            ..MockTag::default()
        };
        let mut backend = ProximityBackend::open(tag).unwrap();

        let atr = backend.atr().unwrap();
        assert_eq!(atr, synthesize_atr(&[0x80, 0x73]));
    }

    #[test]
    fn atr_falls_back_to_type_b() {
        let tag = MockTag {
            type_b: Some(TypeBInfo {
                application_data: vec![0x11, 0x22, 0x33, 0x44],
                protocol_info: vec![0x55, 0x80, 0x77],
            }),
            ..MockTag::default()
        };
        let mut backend = ProximityBackend::open(tag).unwrap();

        let atr = backend.atr().unwrap();
        assert_eq!(atr.len(), 13);
        assert_eq!(&atr[4..12], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x80, 0x77, 0x10]);
    }

    #[test]
    fn atr_without_activation_data_is_minimal() {
        let mut backend = ProximityBackend::open(MockTag::default()).unwrap();
        assert_eq!(backend.atr().unwrap(), synthesize_atr(&[]));
    }

    #[test]
    fn eject_closes_once_and_blocks_further_use() {
        let tag = MockTag::default();
        let closes = Arc::clone(&tag.closes);
        let mut backend = ProximityBackend::open(tag).unwrap();

        backend.eject().unwrap();
        backend.eject().unwrap();
        assert_eq!(*closes.lock().unwrap(), 1);

        assert!(matches!(backend.transmit(&[0x00, 0x00]), Err(BackendError::Ejected)));
        backend.power_off().unwrap();
    }
}
