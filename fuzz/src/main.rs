extern crate afl;
extern crate ldapdecoder;

use afl::fuzz;
use ldapdecoder::{DecodeDriver, DriverConfig, NullSink};
use std::io::Cursor;

fn main() {
    fuzz!(|data: &[u8]| {
        if let Ok(driver) = DecodeDriver::open(Cursor::new(data), DriverConfig::default(), NullSink) {
            match driver.run() {
                Ok((summary, _)) => println!("ok: {} packets", summary.total_packets),
                Err(e) => eprintln!("{}", e),
            }
        }
    });
}
