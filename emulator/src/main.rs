//! Host-side emulation of the encoder acquisition stack.
//!
//! Drives the shared core against simulated timing channels: two encoders
//! spin up, one stalls past its watchdog window, then both reverse. Useful
//! for eyeballing the arbitration and period math without flashing hardware.

mod sim;

use sim::Rig;

fn main() {
    let mut rig = Rig::new();

    let front = rig
        .add_encoder(2, 35_000)
        .expect("front encoder allocation");
    let rear = rig
        .add_encoder(4, 20_000)
        .expect("rear encoder allocation");
    for index in [front, rear] {
        let session = rig.session(index);
        println!(
            "encoder {index}: pins {}+{}, timeout {} us, {}",
            session.base_pin(),
            session.base_pin() + 1,
            session.timeout_us(),
            session.assigned_bank().expect("bound session"),
        );
    }

    println!("\n-- spin-up --");
    for period_us in [12_000.0, 6_000.0, 3_000.0, 1_500.0] {
        rig.capture(front, true, period_us);
        rig.capture(rear, true, period_us / 2.0);
        report(&rig, front);
        report(&rig, rear);
    }

    println!("\n-- rear encoder stalls --");
    rig.capture(front, true, 1_500.0);
    rig.stall(rear);
    report(&rig, front);
    report(&rig, rear);

    println!("\n-- both reverse --");
    for period_us in [4_000.0, 2_000.0] {
        rig.capture(front, false, period_us);
        rig.capture(rear, false, period_us);
        report(&rig, front);
        report(&rig, rear);
    }
}

fn report(rig: &Rig, index: usize) {
    let session = rig.session(index);
    let direction = if session.direction() { "fwd" } else { "rev" };
    println!(
        "encoder {index}: {direction} period {:.1} us",
        session.period_us()
    );
}
