//! Decode engine seam.
//!
//! The engine does the actual reconstruction; the adapter only feeds it one
//! coded unit at a time together with the current [`LayerCommand`].

use crate::error::Result;
use crate::quality::LayerCommand;

/// Planes of one reconstructed picture.
///
/// Each plane is laid out with a row stride of `width + 32` luma bytes;
/// chroma planes hold a quarter of the luma plane's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedPicture {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

/// Result of feeding one coded unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Accepted, no picture completed.
    NeedsMore,
    /// A picture completed.
    Produced(DecodedPicture),
    /// The unit was rejected with an engine-specific code.
    Error(i32),
}

/// Layered decode engine.
pub trait DecodeEngine {
    /// Feed one coded unit (NAL header included, no start code or length).
    fn decode_unit(&mut self, unit: &[u8], command: &LayerCommand) -> DecodeStatus;

    /// Release engine resources.
    fn close(&mut self) {}
}

/// Creates decode engines.
pub trait EngineFactory {
    /// Open a fresh engine instance.
    fn open(&mut self) -> Result<Box<dyn DecodeEngine>>;
}

impl<F> EngineFactory for F
where
    F: FnMut() -> Result<Box<dyn DecodeEngine>>,
{
    fn open(&mut self) -> Result<Box<dyn DecodeEngine>> {
        self()
    }
}

/// Owned engine instance, closed exactly once when dropped.
pub struct EngineHandle {
    engine: Box<dyn DecodeEngine>,
}

impl EngineHandle {
    /// Open an engine from `factory`.
    pub fn open<F: EngineFactory + ?Sized>(factory: &mut F) -> Result<Self> {
        let engine = factory.open()?;
        tracing::debug!("Opened decode engine");
        Ok(Self { engine })
    }

    /// Feed one coded unit.
    pub fn decode(&mut self, unit: &[u8], command: &LayerCommand) -> DecodeStatus {
        self.engine.decode_unit(unit, command)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.engine.close();
        tracing::debug!("Closed decode engine");
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SvcError;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingEngine {
        closed: Rc<Cell<u32>>,
    }

    impl DecodeEngine for CountingEngine {
        fn decode_unit(&mut self, unit: &[u8], _command: &LayerCommand) -> DecodeStatus {
            if unit.is_empty() {
                DecodeStatus::Error(-1)
            } else {
                DecodeStatus::NeedsMore
            }
        }

        fn close(&mut self) {
            self.closed.set(self.closed.get() + 1);
        }
    }

    #[test]
    fn test_handle_closes_once_on_drop() {
        let closed = Rc::new(Cell::new(0));
        let engine_closed = closed.clone();
        let mut factory = move || -> Result<Box<dyn DecodeEngine>> {
            Ok(Box::new(CountingEngine {
                closed: engine_closed.clone(),
            }))
        };

        let mut handle = EngineHandle::open(&mut factory).unwrap();
        let cmd = LayerCommand::initial();
        assert_eq!(handle.decode(&[0x65], &cmd), DecodeStatus::NeedsMore);
        assert_eq!(handle.decode(&[], &cmd), DecodeStatus::Error(-1));
        assert_eq!(closed.get(), 0);
        drop(handle);
        assert_eq!(closed.get(), 1);
    }

    #[test]
    fn test_open_failure() {
        let mut factory = || -> Result<Box<dyn DecodeEngine>> {
            Err(SvcError::EngineInitFailure("no device".into()))
        };
        assert!(matches!(
            EngineHandle::open(&mut factory),
            Err(SvcError::EngineInitFailure(_))
        ));
    }
}
