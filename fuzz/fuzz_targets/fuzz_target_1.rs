#![no_main]
use libfuzzer_sys::fuzz_target;

use ldapdecoder::{DecodeDriver, DriverConfig, NullSink};

fuzz_target!(|data: &[u8]| {
    if let Ok(driver) = DecodeDriver::open(std::io::Cursor::new(data), DriverConfig::default(), NullSink) {
        let _ = driver.run();
    }
});
