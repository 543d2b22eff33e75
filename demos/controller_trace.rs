//! Example: Cycle trace of the tile controller
//!
//! Steps one tile through IDLE -> LOAD -> LOAD_WAIT -> COMPUTE -> WAIT ->
//! STORE -> DONE and prints the handshake on every edge.
//!
//! Run with: cargo run --example controller_trace

use tiled_npu::{AccumulatorSite, NpuConfig, TileController, TileOperands, TileState};

fn main() {
    println!("=== Tile Controller Trace ===\n");

    // Small 2x4 array so the operands fit on one line
    let config = NpuConfig::new(2, 4);
    let mut controller = TileController::new(&config).unwrap();

    let weights = [1, 2, 3, 4, -1, -2, -3, -4];
    let input = [1, 1, 2, 2];
    controller
        .load_tile(
            TileOperands {
                weights: &weights,
                input: &input,
                partial: &[],
            },
            AccumulatorSite::Array,
        )
        .unwrap();

    println!("{:>5}  {:<22} {:>4} {:>4} {:>5}", "cycle", "state", "busy", "done", "valid");
    let mut start = true;
    loop {
        let state = controller.state();
        let status = controller.tick(start, true).unwrap();
        start = false;
        println!(
            "{:>5}  {:<22} {:>4} {:>4} {:>5}",
            controller.cycle(),
            format!("{:?}", state),
            u8::from(status.busy),
            u8::from(status.done),
            u8::from(controller.array().valid_out())
        );
        if state == TileState::Done {
            break;
        }
    }

    println!("\nOutput buffer: {:?}", controller.output_buffer());
    println!("Expected:      [{}, {}]", 1 + 2 + 6 + 8, -(1 + 2 + 6 + 8));
}
