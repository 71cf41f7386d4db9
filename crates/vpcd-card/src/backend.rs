use crate::error::Result;

/// Capability interface over a concrete card.
///
/// A session owns exactly one backend and drives it from a single thread, so
/// every operation takes `&mut self` and completes before the next frame is
/// read. `eject` is called once at session teardown on every exit path;
/// implementations must tolerate calls to `power_off` after a failure and
/// should make `eject` idempotent.
pub trait CardBackend: Send {
    /// Short name used in logs and events.
    fn name(&self) -> &'static str;

    /// Activate the card. Idempotent when already active.
    fn power_on(&mut self) -> Result<()>;

    /// Deactivate the card. Safe to call more than once.
    fn power_off(&mut self) -> Result<()>;

    /// Warm reset. Backends without a reset primitive may substitute a
    /// benign command; see the backend's own docs.
    fn reset(&mut self) -> Result<()>;

    /// The card's Answer-To-Reset.
    fn atr(&mut self) -> Result<Vec<u8>>;

    /// Exchange one command APDU for its response.
    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;

    /// Release every resource held by the backend.
    fn eject(&mut self) -> Result<()>;
}

impl<B: CardBackend + ?Sized> CardBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn power_on(&mut self) -> Result<()> {
        (**self).power_on()
    }

    fn power_off(&mut self) -> Result<()> {
        (**self).power_off()
    }

    fn reset(&mut self) -> Result<()> {
        (**self).reset()
    }

    fn atr(&mut self) -> Result<Vec<u8>> {
        (**self).atr()
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        (**self).transmit(apdu)
    }

    fn eject(&mut self) -> Result<()> {
        (**self).eject()
    }
}
