#![no_main]
use libfuzzer_sys::arbitrary::{self, Arbitrary};
use libfuzzer_sys::fuzz_target;
use vcu_core::CanFrameRouter;
use vcu_traits::{CanFrame, FrameFormat};

#[derive(Debug, Arbitrary)]
struct RawFrame {
    id: u16,
    extended: bool,
    payload: Vec<u8>,
}

fuzz_target!(|frames: Vec<RawFrame>| {
    let mut router = CanFrameRouter::new(25);
    for f in frames {
        // Bias identifiers into the decoded telemetry ranges.
        let id = match f.id % 3 {
            0 => 0xA0 + u32::from(f.id % 13),
            1 => 0x622 + u32::from(f.id % 8),
            _ => u32::from(f.id),
        };
        let format = if f.extended { FrameFormat::Extended } else { FrameFormat::Standard };
        let len = f.payload.len().min(8);
        if let Ok(frame) = CanFrame::new(id, format, &f.payload[..len]) {
            let _ = router.route(&frame);
        }
    }
    let s = router.state();
    let _ = (s.mcu.power_kw(), s.bms.power_kw());
});
