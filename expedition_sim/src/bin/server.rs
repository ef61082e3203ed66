use std::io::{BufRead, BufReader};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use bevy::ecs::event::ManualEventReader;
use bevy::prelude::{App, Entity, Events};
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{error, info, warn};

use expedition_runtime::{parse_command_line, CommandPayload};
use expedition_sim::network::{start_console_state_server, ConsoleStateServer};
use expedition_sim::station::console_view;
use expedition_sim::{
    build_headless_app, run_tick, spawn_map, spawn_station, ClaimMission, ConsoleDenied,
    ConsoleStatePushed, DefaultMap, ExpeditionAnnouncement, ExpeditionConfigHandle,
    ExpeditionData, ExpeditionMetrics, FinishMission, RoundStarted, SaveShipRequest, ShipSaved,
    ShipyardMap, StationData, StationLayout,
};

const SERVER_TARGET: &str = "salvage::server";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut app = build_headless_app();
    let config = app.world.resource::<ExpeditionConfigHandle>().get();

    let home = spawn_map(&mut app.world);
    let shipyard = spawn_map(&mut app.world);
    app.world.resource_mut::<DefaultMap>().0 = Some(home);
    app.world.resource_mut::<ShipyardMap>().0 = Some(shipyard);
    app.world.spawn(StationData::default());
    let station = spawn_station(&mut app.world, home, "Pioneer");

    let stream = start_console_state_server(config.console_stream_bind());
    let mut outbound = Outbound::new(&app);
    run_tick(&mut app);
    outbound.drain(&app, stream.as_ref());

    let command_rx = match spawn_command_listener(config.command_bind()) {
        Ok(receiver) => receiver,
        Err(err) => {
            error!(
                target: SERVER_TARGET,
                addr = %config.command_bind(),
                error = %err,
                "command_listener.bind_failed"
            );
            return;
        }
    };

    info!(
        target: SERVER_TARGET,
        command_bind = %config.command_bind(),
        console_stream_bind = %config.console_stream_bind(),
        station = ?station.grid,
        console = ?station.console,
        "expedition server ready"
    );

    while let Ok(command) = command_rx.recv() {
        let verb = command.verb();
        match command {
            CommandPayload::Tick { steps } => {
                for _ in 0..steps.max(1) {
                    run_tick(&mut app);
                    outbound.drain(&app, stream.as_ref());
                }
            }
            CommandPayload::Claim {
                index,
                console_bits,
            } => {
                let Some(console) = resolve(console_bits, station.console) else {
                    continue;
                };
                app.world
                    .resource_mut::<Events<ClaimMission>>()
                    .send(ClaimMission { console, index });
                run_tick(&mut app);
                outbound.drain(&app, stream.as_ref());
            }
            CommandPayload::Finish { console_bits } => {
                let Some(console) = resolve(console_bits, station.console) else {
                    continue;
                };
                app.world
                    .resource_mut::<Events<FinishMission>>()
                    .send(FinishMission { console });
                run_tick(&mut app);
                outbound.drain(&app, stream.as_ref());
            }
            CommandPayload::RoundStart => {
                app.world
                    .resource_mut::<Events<RoundStarted>>()
                    .send(RoundStarted);
                run_tick(&mut app);
                outbound.drain(&app, stream.as_ref());
            }
            CommandPayload::SaveShip {
                console_bits,
                actor_bits,
            } => {
                let console = resolve(Some(console_bits), station.console);
                let actor = resolve(Some(actor_bits), station.console);
                let (Some(console), Some(actor)) = (console, actor) else {
                    continue;
                };
                app.world
                    .resource_mut::<Events<SaveShipRequest>>()
                    .send(SaveShipRequest {
                        console,
                        actor: Some(actor),
                    });
                run_tick(&mut app);
                outbound.drain(&app, stream.as_ref());
            }
            CommandPayload::Status => log_status(&app, &station),
        }
        info!(target: SERVER_TARGET, command = verb, "command.applied");
    }
}

fn resolve(bits: Option<u64>, fallback: Entity) -> Option<Entity> {
    let Some(bits) = bits else {
        return Some(fallback);
    };
    match Entity::try_from_bits(bits) {
        Ok(entity) => Some(entity),
        Err(err) => {
            warn!(target: SERVER_TARGET, bits, error = %err, "command.invalid_entity");
            None
        }
    }
}

/// Cursors over the events the server reports on after each tick.
struct Outbound {
    pushes: ManualEventReader<ConsoleStatePushed>,
    denials: ManualEventReader<ConsoleDenied>,
    announcements: ManualEventReader<ExpeditionAnnouncement>,
    saves: ManualEventReader<ShipSaved>,
}

impl Outbound {
    fn new(app: &App) -> Self {
        Self {
            pushes: app.world.resource::<Events<ConsoleStatePushed>>().get_reader(),
            denials: app.world.resource::<Events<ConsoleDenied>>().get_reader(),
            announcements: app
                .world
                .resource::<Events<ExpeditionAnnouncement>>()
                .get_reader(),
            saves: app.world.resource::<Events<ShipSaved>>().get_reader(),
        }
    }

    fn drain(&mut self, app: &App, stream: Option<&ConsoleStateServer>) {
        let pushes = app.world.resource::<Events<ConsoleStatePushed>>();
        for push in self.pushes.read(pushes) {
            if let Some(server) = stream {
                server.broadcast_push(push);
            }
        }

        let denials = app.world.resource::<Events<ConsoleDenied>>();
        for denial in self.denials.read(denials) {
            info!(
                target: SERVER_TARGET,
                console = ?denial.console,
                sound = %denial.sound,
                reason = %denial.reason,
                "console.denied"
            );
        }

        let announcements = app.world.resource::<Events<ExpeditionAnnouncement>>();
        for announcement in self.announcements.read(announcements) {
            info!(
                target: SERVER_TARGET,
                map = ?announcement.map,
                message = %announcement.message,
                "announcement"
            );
        }

        let saves = app.world.resource::<Events<ShipSaved>>();
        for saved in self.saves.read(saves) {
            info!(
                target: SERVER_TARGET,
                ship = %saved.ship_name,
                user = %saved.user_id,
                "ship.saved"
            );
        }
    }
}

fn log_status(app: &App, station: &StationLayout) {
    let metrics = app.world.resource::<ExpeditionMetrics>();
    info!(
        target: SERVER_TARGET,
        tick = metrics.tick,
        clock_secs = metrics.clock_secs,
        stations = metrics.stations,
        cooling_down = metrics.stations_cooling_down,
        generating = metrics.expeditions_generating,
        active = metrics.expeditions_active,
        final_countdown = metrics.expeditions_final_countdown,
        queued_jobs = metrics.queued_jobs,
        jobs_finished = metrics.jobs_finished,
        jobs_failed = metrics.jobs_failed,
        jobs_cancelled = metrics.jobs_cancelled,
        "status"
    );

    if let Some(data) = app.world.get::<ExpeditionData>(station.grid) {
        for mission in data.missions.values() {
            info!(
                target: SERVER_TARGET,
                index = mission.index,
                mission_type = mission.mission_type.as_str(),
                difficulty = %mission.difficulty,
                active = mission.index == data.active_mission,
                "status.mission"
            );
        }
    }
    if let Some(ui) = console_view(&app.world, station.console) {
        info!(
            target: SERVER_TARGET,
            revision = ui.revision,
            cooldown = ui.state.as_ref().map(|state| state.cooldown),
            can_finish = ui.state.as_ref().map(|state| state.can_finish),
            "status.console"
        );
    }
}

fn spawn_command_listener(bind_addr: SocketAddr) -> std::io::Result<Receiver<CommandPayload>> {
    let listener = TcpListener::bind(bind_addr)?;
    listener.set_nonblocking(true)?;

    let (sender, receiver) = unbounded::<CommandPayload>();
    thread::spawn(move || loop {
        match listener.accept() {
            Ok((stream, addr)) => {
                info!(target: SERVER_TARGET, %addr, "command_client.connected");
                let sender = sender.clone();
                thread::spawn(move || handle_client(stream, sender));
            }
            Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                warn!(target: SERVER_TARGET, error = %err, "command_client.accept_failed");
                thread::sleep(Duration::from_millis(200));
            }
        }
    });

    Ok(receiver)
}

fn handle_client(stream: TcpStream, sender: Sender<CommandPayload>) {
    if let Err(err) = stream.set_nonblocking(false) {
        warn!(target: SERVER_TARGET, error = %err, "command_client.blocking_failed");
    }
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_command_line(trimmed) {
                    Ok(command) => {
                        if sender.send(command).is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        warn!(target: SERVER_TARGET, input = trimmed, error = %err, "command.invalid")
                    }
                }
            }
            Err(err) => {
                warn!(target: SERVER_TARGET, error = %err, "command_client.read_failed");
                break;
            }
        }
    }
}
