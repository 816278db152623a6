use chrono::{DateTime, Utc};
use influxdb::{Client, InfluxDbWriteable, WriteQuery};
use std::io::Read;
use std::time::{Duration, Instant};
use zerocopy::TryFromBytes;

use shared::state::State;

#[derive(Clone, Debug, InfluxDbWriteable)]
struct Sample {
    time: DateTime<Utc>,

    tick: u32,
    state: String,
    phase: String,
    hbridge: String,

    servo_pos: i32,
    proximity: u32,
    cell_mv: i32,
    temp_c: f64,
    charge_done: u32,
}

fn to_sample(s: &State) -> Sample {
    Sample {
        time: Utc::now(),
        tick: s.tick,
        state: format!("{:?}", s.state),
        phase: format!("{:?}", s.phase),
        hbridge: format!("{:?}", s.hbridge),
        servo_pos: s.servo_pos,
        proximity: s.proximity,
        cell_mv: s.cell_mv,
        temp_c: s.temp_c as f64,
        charge_done: s.charge_done,
    }
}

#[tokio::main]
async fn main() {
    let token = std::env::var("INFLUX_TOKEN").unwrap();
    let ip = std::env::var("INFLUX_IP").unwrap();
    let client = Client::new(ip, "feeder").with_token(token);

    let port_name = find_port().expect("charger not found");
    println!("charger @ {}", port_name);

    // Baudrate doesn't matter because this port is CDC
    let mut port = serialport::new(port_name, 1_000_000)
        .timeout(Duration::from_millis(2_000))
        .open()
        .expect("Failed to open port");

    let mut packet_buf: Vec<u8> = Vec::new();
    let mut last_rx_time = Instant::now();
    let mut packet_complete = false;
    let mut frames: Vec<WriteQuery> = vec![];

    loop {
        let mut buf = [0u8; 1024];

        let bytes_available = (port.bytes_to_read().unwrap() as usize).min(buf.len());
        if bytes_available > 0 {
            port.read_exact(&mut buf[0..bytes_available]).unwrap();
            packet_buf.extend_from_slice(&buf[0..bytes_available]);

            last_rx_time = Instant::now();
            packet_complete = false;
        }

        // Wait for the serial port to go idle to frame packets. Anything that
        // is not exactly one State frame is passed through as log output.
        if last_rx_time.elapsed() >= Duration::from_millis(10) && !packet_complete {
            if packet_buf.len() == core::mem::size_of::<State>() {
                match State::try_ref_from_bytes(&packet_buf) {
                    Ok(state) => frames.push(to_sample(state).into_query("feeder")),
                    Err(_) => print!("{}", String::from_utf8_lossy(&packet_buf)),
                }
            } else if !packet_buf.is_empty() {
                print!("{}", String::from_utf8_lossy(&packet_buf));
            }

            packet_complete = true;
            packet_buf.clear();
        }

        if frames.len() >= 20 {
            if client.query(&frames).await.is_err() {
                if frames.len() >= 1000 {
                    println!("Too many failed write attempts");
                    println!("\x07"); // terminal bell
                    std::process::exit(1);
                } else {
                    println!("Write failed, continuing...");
                }
            } else {
                frames.clear();
            }
        }
    }
}

fn find_port() -> Option<String> {
    let ports = serialport::available_ports().expect("No ports found");
    for p in ports {
        if let serialport::SerialPortType::UsbPort(usb_port) = p.port_type {
            if usb_port
                .manufacturer
                .is_some_and(|m| m.eq_ignore_ascii_case("espressif"))
            {
                return Some(p.port_name);
            }
        }
    }
    None
}
