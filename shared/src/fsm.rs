// Cell-handling state machine. The scheduler calls `run` once per 10 ms tick;
// no handler blocks. Every wait of the mechanical/electrical sequence is a
// phase deadline checked against the tick counter, so the eject override and
// the status panel stay live all the way through a cycle.

use embedded_hal::digital::OutputPin;
use libm::fabsf;

use crate::hbridge::HBridge;
use crate::motion::{Pace, Sequencer, ServoDrive, CONTACT_US, LOWER_LIMIT_US, UPPER_LIMIT_US};
use crate::polarity::{classify, CellReading};
use crate::state::{ChargeState, HBridgeState, Phase, State};

pub const TICKS_PER_SECOND: u32 = 100;

const FEED_SETTLE_TICKS: u32 = TICKS_PER_SECOND; // cell drops into the arm
const CONTACT_SETTLE_TICKS: u32 = TICKS_PER_SECOND / 2; // seat + sense lines settle
const QUALIFY_TICKS: u32 = 3 * TICKS_PER_SECOND; // charge IC checks the cell
const EJECT_RESET_TICKS: u32 = 5 * TICKS_PER_SECOND; // charge IC reset time
const LEVEL_STEP_TICKS: u32 = TICKS_PER_SECOND / 2; // charge indicator rotation

const TEMP_MIN_C: f32 = 0.0;
const TEMP_MAX_C: f32 = 60.0;

pub struct Config {
    pub prox_threshold: u16,
    pub volt_samples: u16,
    pub temp_samples: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prox_threshold: 75,
            volt_samples: 16,
            temp_samples: 5,
        }
    }
}

// Per-tick snapshot of the digital inputs. The scheduler samples these once
// per tick so no decision ever sees two values of the same signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inputs {
    pub proximity: u16,
    pub charge_done: bool,
    pub eject: bool,
}

pub trait CellSense {
    fn sample_volts(&mut self, samples: u16) -> f32;
}

pub trait ThermalSense {
    fn sample_temp_c(&mut self, samples: u16) -> f32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeLevel {
    One,
    Two,
    Three,
    Full,
}

pub trait StatusPanel {
    fn set_status(&mut self, text: &str);
    fn clear_status(&mut self);
    fn set_charge_level(&mut self, volts: f32, level: ChargeLevel);
    fn clear_charge_level(&mut self);
}

pub fn run<P, D, A, S>(
    s: &mut State,
    cfg: &Config,
    inputs: &Inputs,
    bridge: &mut HBridge<P>,
    servo: &mut Sequencer<D>,
    analog: &mut A,
    panel: &mut S,
) -> Result<(), P::Error>
where
    P: OutputPin,
    D: ServoDrive,
    A: CellSense + ThermalSense,
    S: StatusPanel,
{
    s.tick = s.tick.wrapping_add(1);
    s.proximity = inputs.proximity as u32;
    s.charge_done = inputs.charge_done as u32;

    // The override button preempts whatever the machine is doing.
    if inputs.eject && s.state != ChargeState::EndCharge {
        begin_eject(s, bridge, servo, panel)?;
    }

    match s.state {
        ChargeState::Wakeup => {
            if servo.step_toward(LOWER_LIMIT_US, Pace::Transit) {
                enter(s, ChargeState::Idle);
            }
        }

        ChargeState::Idle => {
            servo.step_toward(LOWER_LIMIT_US, Pace::Transit);
            if inputs.proximity > cfg.prox_threshold {
                panel.set_status("Loading Cell...");
                enter(s, ChargeState::Feed);
            }
        }

        ChargeState::Feed => match s.phase {
            Phase::Moving => {
                if servo.step_toward(UPPER_LIMIT_US, Pace::Transit) {
                    settle(s);
                }
            }
            _ => {
                if elapsed(s) >= FEED_SETTLE_TICKS {
                    enter(s, ChargeState::Contact);
                }
            }
        },

        ChargeState::Contact => match s.phase {
            Phase::Moving => {
                // the bridge stays off while the arm presses the cell home
                set_bridge(s, bridge, HBridgeState::Off)?;
                if servo.step_toward(CONTACT_US, Pace::Approach) {
                    settle(s);
                }
            }
            Phase::Settling => {
                if elapsed(s) >= CONTACT_SETTLE_TICKS {
                    // One sample decides both plausibility and polarity.
                    let volts = analog.sample_volts(cfg.volt_samples);
                    s.cell_mv = (volts * 1000.0) as i32;
                    match classify(volts) {
                        CellReading::NoCell => begin_eject(s, bridge, servo, panel)?,
                        CellReading::TerminalAPositive(_) => {
                            engage(s, bridge, servo, panel, HBridgeState::TerminalAPositive)?;
                        }
                        CellReading::TerminalBPositive(_) => {
                            engage(s, bridge, servo, panel, HBridgeState::TerminalBPositive)?;
                        }
                    }
                }
            }
            Phase::Qualifying => {
                if elapsed(s) >= QUALIFY_TICKS {
                    panel.clear_status();
                    enter(s, ChargeState::Charge);
                }
            }
        },

        ChargeState::Charge => {
            s.temp_c = analog.sample_temp_c(cfg.temp_samples);
            if s.temp_c < TEMP_MIN_C || s.temp_c > TEMP_MAX_C {
                // thermal window is a hard gate, not advice
                begin_eject(s, bridge, servo, panel)?;
            } else if inputs.charge_done {
                // TODO: report a distinct fault outcome if a separate fault
                // line from the charge IC ever gets wired in; STAT conflates
                // "done" and "fault" today.
                begin_eject(s, bridge, servo, panel)?;
            } else if s.tick.is_multiple_of(LEVEL_STEP_TICKS) {
                let volts = analog.sample_volts(cfg.volt_samples);
                s.cell_mv = (volts * 1000.0) as i32;
                panel.set_charge_level(fabsf(volts), level_for(s.tick));
            }
        }

        ChargeState::EndCharge => match s.phase {
            Phase::Moving => {
                set_bridge(s, bridge, HBridgeState::Off)?;
                if servo.step_toward(LOWER_LIMIT_US, Pace::Transit) {
                    settle(s);
                }
            }
            _ => {
                if elapsed(s) >= EJECT_RESET_TICKS {
                    panel.clear_status();
                    enter(s, ChargeState::Idle);
                }
            }
        },
    }

    s.servo_pos = servo.position_us();
    Ok(())
}

fn enter(s: &mut State, next: ChargeState) {
    s.state = next;
    s.phase = Phase::Moving;
    s.phase_tick = s.tick;
}

fn settle(s: &mut State) {
    s.phase = Phase::Settling;
    s.phase_tick = s.tick;
}

fn elapsed(s: &State) -> u32 {
    s.tick.wrapping_sub(s.phase_tick)
}

fn level_for(tick: u32) -> ChargeLevel {
    match (tick / LEVEL_STEP_TICKS) % 4 {
        0 => ChargeLevel::One,
        1 => ChargeLevel::Two,
        2 => ChargeLevel::Three,
        _ => ChargeLevel::Full,
    }
}

fn set_bridge<P: OutputPin>(
    s: &mut State,
    bridge: &mut HBridge<P>,
    state: HBridgeState,
) -> Result<(), P::Error> {
    if s.hbridge != state {
        bridge.set(state)?;
        s.hbridge = state;
    }
    Ok(())
}

// A polarity has been decided: energize the bridge, release the arm so it
// does not fight the contact spring, and give the charge IC its
// qualification window.
fn engage<P: OutputPin, D: ServoDrive, S: StatusPanel>(
    s: &mut State,
    bridge: &mut HBridge<P>,
    servo: &mut Sequencer<D>,
    panel: &mut S,
    polarity: HBridgeState,
) -> Result<(), P::Error> {
    set_bridge(s, bridge, polarity)?;
    servo.detach();
    panel.set_status("Checking Cell...");
    s.phase = Phase::Qualifying;
    s.phase_tick = s.tick;
    Ok(())
}

// Every way a cell leaves the machine funnels through here: completion,
// fault, rejection, overtemperature, operator override.
fn begin_eject<P: OutputPin, D: ServoDrive, S: StatusPanel>(
    s: &mut State,
    bridge: &mut HBridge<P>,
    servo: &mut Sequencer<D>,
    panel: &mut S,
) -> Result<(), P::Error> {
    panel.clear_charge_level();
    panel.set_status("Ejecting Cell...");
    servo.attach();
    set_bridge(s, bridge, HBridgeState::Off)?;
    enter(s, ChargeState::EndCharge);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hbridge::tests::{mock_bridge, MockPin, PinLog};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::string::String;
    use std::vec::Vec;

    #[derive(Clone, Default)]
    struct MockServo {
        pulses: Rc<RefCell<Vec<u16>>>,
        releases: Rc<RefCell<u32>>,
    }

    impl ServoDrive for MockServo {
        fn write_pulse_us(&mut self, us: u16) {
            self.pulses.borrow_mut().push(us);
        }

        fn release(&mut self) {
            *self.releases.borrow_mut() += 1;
        }
    }

    struct MockAnalog {
        volts: f32,
        temp_c: f32,
        volt_calls: u32,
        temp_calls: u32,
    }

    impl CellSense for MockAnalog {
        fn sample_volts(&mut self, _samples: u16) -> f32 {
            self.volt_calls += 1;
            self.volts
        }
    }

    impl ThermalSense for MockAnalog {
        fn sample_temp_c(&mut self, _samples: u16) -> f32 {
            self.temp_calls += 1;
            self.temp_c
        }
    }

    #[derive(Default)]
    struct MockPanel {
        status: Option<String>,
        level_updates: Vec<(f32, ChargeLevel)>,
    }

    impl StatusPanel for MockPanel {
        fn set_status(&mut self, text: &str) {
            self.status = Some(String::from(text));
        }

        fn clear_status(&mut self) {
            self.status = None;
        }

        fn set_charge_level(&mut self, volts: f32, level: ChargeLevel) {
            self.level_updates.push((volts, level));
        }

        fn clear_charge_level(&mut self) {
            self.level_updates.clear();
        }
    }

    struct Rig {
        s: State,
        cfg: Config,
        bridge: HBridge<MockPin>,
        pin_log: PinLog,
        servo: Sequencer<MockServo>,
        analog: MockAnalog,
        panel: MockPanel,
        visited: Vec<ChargeState>,
    }

    impl Rig {
        fn new() -> Rig {
            let (bridge, pin_log) = mock_bridge();
            Rig {
                s: State::default(),
                cfg: Config::default(),
                bridge,
                pin_log,
                servo: Sequencer::new(MockServo::default()),
                analog: MockAnalog {
                    volts: 0.9,
                    temp_c: 25.0,
                    volt_calls: 0,
                    temp_calls: 0,
                },
                panel: MockPanel::default(),
                visited: Vec::new(),
            }
        }

        fn tick(&mut self, inputs: Inputs) {
            run(
                &mut self.s,
                &self.cfg,
                &inputs,
                &mut self.bridge,
                &mut self.servo,
                &mut self.analog,
                &mut self.panel,
            )
            .unwrap();
            if self.visited.last() != Some(&self.s.state) {
                self.visited.push(self.s.state);
            }
        }

        fn run_ticks(&mut self, n: u32, inputs: Inputs) {
            for _ in 0..n {
                self.tick(inputs);
            }
        }

        // Tick with constant inputs until `pred` holds; panics if it never does.
        fn run_until(&mut self, inputs: Inputs, max: u32, pred: fn(&State) -> bool) -> u32 {
            for n in 0..max {
                self.tick(inputs);
                if pred(&self.s) {
                    return n + 1;
                }
            }
            panic!("condition not reached in {} ticks, state {:?}", max, self.s.state);
        }

        // One cell-present tick, then run to the Contact decision and beyond.
        fn advance_to_charge(&mut self) {
            self.tick(Inputs {
                proximity: 80,
                ..Inputs::default()
            });
            assert_eq!(self.s.state, ChargeState::Feed);
            self.run_until(Inputs::default(), 2_000, |s| s.state == ChargeState::Charge);
        }

        fn bridge_ever_energized(&self) -> bool {
            self.pin_log.borrow().iter().any(|&(_, level)| level)
        }
    }

    #[test]
    fn idle_holds_at_or_below_threshold() {
        let mut rig = Rig::new();
        rig.run_ticks(
            500,
            Inputs {
                proximity: 75,
                ..Inputs::default()
            },
        );
        assert_eq!(rig.s.state, ChargeState::Idle);
        assert_eq!(rig.s.servo_pos, LOWER_LIMIT_US);
    }

    #[test]
    fn idle_to_feed_above_threshold() {
        let mut rig = Rig::new();
        rig.tick(Inputs {
            proximity: 76,
            ..Inputs::default()
        });
        assert_eq!(rig.s.state, ChargeState::Feed);
        assert_eq!(rig.panel.status.as_deref(), Some("Loading Cell..."));
    }

    #[test]
    fn feed_raises_arm_then_settles_into_contact() {
        let mut rig = Rig::new();
        rig.tick(Inputs {
            proximity: 80,
            ..Inputs::default()
        });
        rig.run_until(Inputs::default(), 1_000, |s| s.state == ChargeState::Contact);
        assert_eq!(rig.s.servo_pos, UPPER_LIMIT_US);
    }

    #[test]
    fn contact_rejects_weak_cell_without_energizing_bridge() {
        let mut rig = Rig::new();
        rig.analog.volts = 0.05;
        rig.tick(Inputs {
            proximity: 80,
            ..Inputs::default()
        });
        rig.run_until(Inputs::default(), 2_000, |s| s.state == ChargeState::EndCharge);
        assert_eq!(rig.s.hbridge, HBridgeState::Off);
        assert!(!rig.bridge_ever_energized());
        assert!(!rig.visited.contains(&ChargeState::Charge));
    }

    #[test]
    fn contact_rejects_overvoltage_cell() {
        let mut rig = Rig::new();
        rig.analog.volts = 1.5;
        rig.tick(Inputs {
            proximity: 80,
            ..Inputs::default()
        });
        rig.run_until(Inputs::default(), 2_000, |s| s.state == ChargeState::EndCharge);
        assert!(!rig.bridge_ever_energized());
        assert!(!rig.visited.contains(&ChargeState::Charge));
    }

    #[test]
    fn forward_cell_charges_terminal_a_positive() {
        let mut rig = Rig::new();
        rig.analog.volts = 0.9;
        rig.advance_to_charge();
        assert_eq!(rig.s.hbridge, HBridgeState::TerminalAPositive);
        assert!(!rig.servo.engaged());
    }

    #[test]
    fn reversed_cell_charges_terminal_b_positive() {
        let mut rig = Rig::new();
        rig.analog.volts = -0.9;
        rig.advance_to_charge();
        assert_eq!(rig.s.hbridge, HBridgeState::TerminalBPositive);
    }

    #[test]
    fn contact_decision_uses_exactly_one_voltage_sample() {
        let mut rig = Rig::new();
        rig.tick(Inputs {
            proximity: 80,
            ..Inputs::default()
        });
        rig.run_until(Inputs::default(), 2_000, |s| s.phase == Phase::Qualifying);
        assert_eq!(rig.analog.volt_calls, 1);
    }

    #[test]
    fn charge_runs_until_status_signals_done() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.run_ticks(300, Inputs::default());
        assert_eq!(rig.s.state, ChargeState::Charge);
        assert!(!rig.panel.level_updates.is_empty());

        rig.tick(Inputs {
            charge_done: true,
            ..Inputs::default()
        });
        assert_eq!(rig.s.state, ChargeState::EndCharge);
        assert_eq!(rig.s.hbridge, HBridgeState::Off);
        assert!(rig.servo.engaged());
    }

    #[test]
    fn overtemperature_forces_eject_regardless_of_status() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.analog.temp_c = 65.0;
        rig.tick(Inputs::default());
        assert_eq!(rig.s.state, ChargeState::EndCharge);
        assert_eq!(rig.s.hbridge, HBridgeState::Off);
    }

    #[test]
    fn subzero_temperature_forces_eject() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.analog.temp_c = -5.0;
        rig.tick(Inputs::default());
        assert_eq!(rig.s.state, ChargeState::EndCharge);
    }

    #[test]
    fn in_window_temperature_keeps_charging() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.analog.temp_c = 59.0;
        rig.run_ticks(500, Inputs::default());
        assert_eq!(rig.s.state, ChargeState::Charge);
        assert!(rig.analog.temp_calls >= 500);
    }

    #[test]
    fn endcharge_lowers_arm_waits_reset_then_idles() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.tick(Inputs {
            charge_done: true,
            ..Inputs::default()
        });

        let down_ticks = rig.run_until(Inputs::default(), 200, |s| s.phase == Phase::Settling);
        assert_eq!(rig.s.servo_pos, LOWER_LIMIT_US);

        let idle_ticks = rig.run_until(Inputs::default(), 1_000, |s| s.state == ChargeState::Idle);
        assert!(idle_ticks >= EJECT_RESET_TICKS - down_ticks);
        assert_eq!(rig.s.hbridge, HBridgeState::Off);
        assert!(rig.panel.status.is_none());
    }

    #[test]
    fn eject_override_lands_within_one_tick() {
        let mut rig = Rig::new();
        rig.advance_to_charge();
        rig.tick(Inputs {
            eject: true,
            ..Inputs::default()
        });
        assert_eq!(rig.s.state, ChargeState::EndCharge);
        assert_eq!(rig.s.hbridge, HBridgeState::Off);
        assert!(rig.servo.engaged());
    }

    #[test]
    fn eject_override_works_from_idle() {
        let mut rig = Rig::new();
        rig.tick(Inputs {
            eject: true,
            ..Inputs::default()
        });
        assert_eq!(rig.s.state, ChargeState::EndCharge);
        rig.run_until(Inputs::default(), 1_000, |s| s.state == ChargeState::Idle);
    }

    #[test]
    fn full_cycle_returns_to_idle() {
        let mut rig = Rig::new();
        rig.analog.volts = 0.9;
        rig.advance_to_charge();
        rig.run_ticks(120, Inputs::default());
        rig.tick(Inputs {
            charge_done: true,
            ..Inputs::default()
        });
        rig.run_until(Inputs::default(), 1_000, |s| s.state == ChargeState::Idle);
        assert_eq!(
            rig.visited,
            std::vec![
                ChargeState::Feed,
                ChargeState::Contact,
                ChargeState::Charge,
                ChargeState::EndCharge,
                ChargeState::Idle,
            ]
        );
        assert_eq!(rig.s.servo_pos, LOWER_LIMIT_US);
    }

    #[test]
    fn wakeup_homes_then_idles() {
        let mut rig = Rig::new();
        rig.s.state = ChargeState::Wakeup;
        rig.tick(Inputs::default());
        assert_eq!(rig.s.state, ChargeState::Idle);
    }
}
