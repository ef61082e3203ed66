mod common;

use anyhow::{ensure, Context, Result};
use common::{buffered, Station};
use expedition_runtime::ConsoleFrame;
use expedition_sim::network::write_frame;
use expedition_sim::station::console_view;
use expedition_sim::{ClaimMission, ConsoleStatePushed};

fn read_frame(bytes: &[u8]) -> Result<ConsoleFrame> {
    let (prefix, body) = bytes.split_at(4);
    let len = u32::from_le_bytes(prefix.try_into()?) as usize;
    ensure!(body.len() == len, "frame length prefix should match the body");
    Ok(ConsoleFrame::decode(body)?)
}

#[test]
fn pushed_state_survives_the_wire() -> Result<()> {
    let mut station = Station::new();
    let layout = station.layout;
    let index = station.mission_on("Short");
    station.send(ClaimMission {
        console: layout.console,
        index,
    });
    station.tick();

    let push = buffered::<ConsoleStatePushed>(&station.app)
        .into_iter()
        .rev()
        .find(|push| push.console == layout.console)
        .context("console received a push")?;
    ensure!(push.station == layout.grid);
    ensure!(push.state.claimed);

    let frame = ConsoleFrame {
        console: push.console.to_bits(),
        station: push.station.to_bits(),
        state: push.state.clone(),
    };
    let mut wire = Vec::new();
    write_frame(&mut wire, &frame.encode()?)?;
    let decoded = read_frame(&wire)?;
    ensure!(decoded == frame);

    let ui = console_view(&station.app.world, layout.console).context("console has a UI")?;
    ensure!(ui.state.as_ref() == Some(&decoded.state));
    Ok(())
}
