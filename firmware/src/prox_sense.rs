// VCNL4040 proximity sensor over I2C, watching the input chute. Command
// registers are 16 bit little endian words; only the proximity engine is
// configured and read here.

use bitfield::bitfield;
use esp_hal::i2c::master::I2c;
use esp_hal::Blocking;

const ADDRESS: u8 = 0x60;

#[repr(u8)]
#[allow(dead_code)]
enum Register {
    AlsConf = 0x00,
    PsConf1Conf2 = 0x03,
    PsConf3Ms = 0x04,
    PsData = 0x08,
    AlsData = 0x09,
    Id = 0x0C,
}

bitfield! {
    // PS_CONF1 in the low byte, PS_CONF2 in the high byte
    struct PsConf1Conf2(u16);
    impl Debug;
    ps_hd, set_ps_hd: 11;
    ps_int, set_ps_int: 9, 8;
    ps_duty, set_ps_duty: 7, 6;
    ps_pers, set_ps_pers: 5, 4;
    ps_it, set_ps_it: 3, 1;
    ps_sd, set_ps_sd: 0;
}

pub fn init(i2c: &mut I2c<'_, Blocking>) {
    // power up the proximity engine, everything else at defaults
    let mut conf = PsConf1Conf2(0x0000);
    conf.set_ps_sd(false);
    conf.set_ps_it(0b001);
    write_reg(i2c, Register::PsConf1Conf2, conf.0);
}

pub fn proximity(i2c: &mut I2c<'_, Blocking>) -> u16 {
    read_reg(i2c, Register::PsData)
}

fn write_reg(i2c: &mut I2c<'_, Blocking>, register: Register, word: u16) {
    let bytes = word.to_le_bytes();
    i2c.write(ADDRESS, &[register as u8, bytes[0], bytes[1]]).unwrap();
}

fn read_reg(i2c: &mut I2c<'_, Blocking>, register: Register) -> u16 {
    let mut buffer = [0u8; 2];
    i2c.write_read(ADDRESS, &[register as u8], &mut buffer)
        .unwrap();
    u16::from_le_bytes(buffer)
}
