// Four-switch bridge across the charge terminals. Pure state-to-output
// mapping; the charge FSM owns which state is commanded and only ever
// commands one at a time.

use embedded_hal::digital::OutputPin;

use crate::state::HBridgeState;

pub struct HBridge<P: OutputPin> {
    a_high: P,
    a_low: P,
    b_high: P,
    b_low: P,
}

impl<P: OutputPin> HBridge<P> {
    pub fn new(a_high: P, a_low: P, b_high: P, b_low: P) -> Self {
        HBridge {
            a_high,
            a_low,
            b_high,
            b_low,
        }
    }

    // Break before make: every gate is dropped before the next pair is
    // asserted, so an A<->B swap always passes through an all-off update and
    // the two switches of one leg are never driven at the same time.
    pub fn set(&mut self, state: HBridgeState) -> Result<(), P::Error> {
        self.a_high.set_low()?;
        self.a_low.set_low()?;
        self.b_high.set_low()?;
        self.b_low.set_low()?;

        match state {
            HBridgeState::TerminalAPositive => {
                // A leg sources, B leg sinks
                self.a_high.set_high()?;
                self.b_low.set_high()?;
            }
            HBridgeState::TerminalBPositive => {
                // B leg sources, A leg sinks
                self.b_high.set_high()?;
                self.a_low.set_high()?;
            }
            HBridgeState::Off => {}
        }

        Ok(())
    }
}
