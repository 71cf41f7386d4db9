//! Card simulators wrapped as card backends.

use tracing::debug;

use crate::backend::CardBackend;
use crate::error::{BackendError, Result};

/// An in-process card implementation (for example a Java Card runtime).
pub trait CardSimulator: Send {
    /// ATR the simulated card answers with.
    fn atr(&self) -> Vec<u8>;

    /// Process one command APDU.
    fn process(&mut self, apdu: &[u8]) -> Result<Vec<u8>>;

    /// Return the card to its post-reset state.
    fn reset(&mut self);

    /// Tear the simulator down. Called at most once.
    fn destroy(&mut self);
}

/// [`CardBackend`] over a [`CardSimulator`].
///
/// Power-off and reset both reset the simulator; eject destroys it.
pub struct SimulatorBackend<S> {
    simulator: S,
    destroyed: bool,
}

impl<S: CardSimulator> SimulatorBackend<S> {
    pub fn new(simulator: S) -> Self {
        Self {
            simulator,
            destroyed: false,
        }
    }

    fn live(&mut self) -> Result<&mut S> {
        if self.destroyed {
            return Err(BackendError::Ejected);
        }
        Ok(&mut self.simulator)
    }
}

impl<S: CardSimulator> CardBackend for SimulatorBackend<S> {
    fn name(&self) -> &'static str {
        "simulator"
    }

    fn power_on(&mut self) -> Result<()> {
        self.live().map(|_| ())
    }

    fn power_off(&mut self) -> Result<()> {
        if let Ok(sim) = self.live() {
            sim.reset();
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.live()?.reset();
        Ok(())
    }

    fn atr(&mut self) -> Result<Vec<u8>> {
        Ok(self.live()?.atr())
    }

    fn transmit(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
        self.live()?.process(apdu)
    }

    fn eject(&mut self) -> Result<()> {
        if !self.destroyed {
            self.destroyed = true;
            self.simulator.destroy();
            debug!("simulator destroyed");
        }
        Ok(())
    }
}

/// ATR of the built-in dummy card.
pub const DUMMY_ATR: [u8; 12] = [
    0x3B, 0x68, 0x00, 0xFF, 0x38, 0x2B, 0x41, 0x52, 0x44, 0x6E, 0x73, 0x73,
];

/// Status word the dummy card answers every command with (no precise diagnosis).
pub const DUMMY_RESPONSE: [u8; 2] = [0x6F, 0x00];

/// A card that answers everything with `6F 00`. Useful for wiring checks.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyCard;

impl CardSimulator for DummyCard {
    fn atr(&self) -> Vec<u8> {
        DUMMY_ATR.to_vec()
    }

    fn process(&mut self, _apdu: &[u8]) -> Result<Vec<u8>> {
        Ok(DUMMY_RESPONSE.to_vec())
    }

    fn reset(&mut self) {}

    fn destroy(&mut self) {}
}

/// The dummy card as a ready-to-use backend.
pub fn dummy_backend() -> SimulatorBackend<DummyCard> {
    SimulatorBackend::new(DummyCard)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Default)]
    struct Counting {
        resets: Arc<Mutex<usize>>,
        destroys: Arc<Mutex<usize>>,
    }

    impl CardSimulator for Counting {
        fn atr(&self) -> Vec<u8> {
            vec![0x3B, 0x00]
        }

        fn process(&mut self, apdu: &[u8]) -> Result<Vec<u8>> {
            let mut echo = apdu.to_vec();
            echo.extend_from_slice(&[0x90, 0x00]);
            Ok(echo)
        }

        fn reset(&mut self) {
            *self.resets.lock().unwrap() += 1;
        }

        fn destroy(&mut self) {
            *self.destroys.lock().unwrap() += 1;
        }
    }

    #[test]
    fn dummy_card_answers_6f00() {
        let mut backend = dummy_backend();
        backend.power_on().unwrap();

        assert_eq!(backend.atr().unwrap(), DUMMY_ATR.to_vec());
        assert_eq!(
            backend.transmit(&[0x00, 0xA4, 0x04, 0x00, 0x0C]).unwrap(),
            vec![0x6F, 0x00]
        );
    }

    #[test]
    fn power_off_and_reset_reset_the_simulator() {
        let sim = Counting::default();
        let resets = Arc::clone(&sim.resets);
        let mut backend = SimulatorBackend::new(sim);

        backend.power_off().unwrap();
        backend.reset().unwrap();
        assert_eq!(*resets.lock().unwrap(), 2);
    }

    #[test]
    fn transmit_goes_through_process() {
        let mut backend = SimulatorBackend::new(Counting::default());
        assert_eq!(backend.transmit(&[0x01, 0x02]).unwrap(), vec![0x01, 0x02, 0x90, 0x00]);
    }

    #[test]
    fn eject_destroys_exactly_once() {
        let sim = Counting::default();
        let destroys = Arc::clone(&sim.destroys);
        let mut backend = SimulatorBackend::new(sim);

        backend.eject().unwrap();
        backend.eject().unwrap();
        assert_eq!(*destroys.lock().unwrap(), 1);

        assert!(matches!(backend.atr(), Err(BackendError::Ejected)));
        backend.power_off().unwrap();
    }
}
