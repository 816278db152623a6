use zerocopy::{Immutable, IntoBytes, KnownLayout, TryFromBytes};

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, TryFromBytes, Immutable, Default)]
pub enum ChargeState {
    // power-on homing; normal startup begins in Idle with the arm already low
    Wakeup,
    #[default]
    Idle,
    Feed,
    Contact,
    Charge,
    EndCharge,
}

// Timed sub-step of the current state. Every wait carries a deadline in
// `phase_tick` instead of sleeping, so the machine stays responsive.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, TryFromBytes, Immutable, Default)]
pub enum Phase {
    #[default]
    Moving,
    Settling,
    Qualifying,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoBytes, TryFromBytes, Immutable, Default)]
pub enum HBridgeState {
    #[default]
    Off,
    TerminalAPositive,
    TerminalBPositive,
}

// Streamed raw over the console at a fixed cadence and decoded bit-exact by
// the telemetry ingester, so every field is four bytes and the layout is
// padding free.
#[repr(C)]
#[derive(Debug, Clone, Copy, IntoBytes, TryFromBytes, Immutable, KnownLayout, Default)]
pub struct State {
    pub tick: u32,
    pub state: ChargeState,
    pub phase: Phase,
    pub phase_tick: u32,

    pub hbridge: HBridgeState,
    pub servo_pos: i32,

    pub proximity: u32,
    pub cell_mv: i32,
    pub temp_c: f32,
    pub charge_done: u32,
}
