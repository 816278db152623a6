// Feeder arm position sequencer. The arm is one servo swinging between the
// output chute, the charge contacts, and the input chute; position is the
// commanded pulse width in microseconds.

pub const LOWER_LIMIT_US: i32 = 1176; // output chute / rest position
pub const CONTACT_US: i32 = 1400; // cell pressed against the charge terminals
pub const UPPER_LIMIT_US: i32 = 1677; // input chute retrieval

// Pulse generation contract consumed by the sequencer. Releasing stops the
// pulse train entirely, which drops drive torque.
pub trait ServoDrive {
    fn write_pulse_us(&mut self, us: u16);
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    // chute transits, ~3 ms per unit at the 100 Hz tick
    Transit,
    // final approach onto the contacts, 10 ms per unit
    Approach,
}

impl Pace {
    fn units_per_tick(self) -> i32 {
        match self {
            Pace::Transit => 3,
            Pace::Approach => 1,
        }
    }
}

pub struct Sequencer<D: ServoDrive> {
    drive: D,
    position_us: i32,
    engaged: bool,
}

impl<D: ServoDrive> Sequencer<D> {
    pub fn new(mut drive: D) -> Self {
        drive.write_pulse_us(LOWER_LIMIT_US as u16);
        Sequencer {
            drive,
            position_us: LOWER_LIMIT_US,
            engaged: true,
        }
    }

    pub fn position_us(&self) -> i32 {
        self.position_us
    }

    pub fn engaged(&self) -> bool {
        self.engaged
    }

    // Advance one tick toward `target_us` and emit the new pulse width.
    // Targets outside the mechanical range are clamped, so the position can
    // never leave it. Returns true once the (clamped) target is reached.
    pub fn step_toward(&mut self, target_us: i32, pace: Pace) -> bool {
        let target = target_us.clamp(LOWER_LIMIT_US, UPPER_LIMIT_US);
        let step = pace.units_per_tick();
        let delta = target - self.position_us;
        self.position_us += delta.clamp(-step, step);
        self.engaged = true;
        self.drive.write_pulse_us(self.position_us as u16);
        self.position_us == target
    }

    // Stop the pulse train so the arm can float on the contact spring while
    // the cell charges.
    pub fn detach(&mut self) {
        self.engaged = false;
        self.drive.release();
    }

    pub fn attach(&mut self) {
        self.engaged = true;
        self.drive.write_pulse_us(self.position_us as u16);
    }
}
