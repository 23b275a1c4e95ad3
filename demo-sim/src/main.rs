use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bitstream::CompressionModel;
use clap::Parser;
use codec::{CommandBuffer, CommandData, GhostId, Tick};
use demo_schema::{
    asteroids_collection, ship_command_layout, step_ship, AsteroidState, BulletState, ShipInput,
    ShipState, ASTEROID, BULLET, LEVEL_HEIGHT, LEVEL_WIDTH, SHIP,
};
use replication::{
    replay_prediction, ApplyKind, ConnectionId, GhostReceiver, GhostSender, GhostWorld,
    Handshake, NetworkTime, OutgoingSnapshot, ReceiveError, ReplicationConfig, RpcQueue,
    RpcRegistry, ServerConnection, SimulationContext, SphereRelevancy, TimeConfig, Vec2,
};
use schema::{collection_hash, CommandLayout, GhostCollection, GhostTypeId};
use serde::Serialize;
use tools::{inspect_message, CaptureSchema};

const TICK_RATE: u32 = 60;
const DT: f32 = 1.0 / TICK_RATE as f32;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic Asteroids server and clients over a lossy in-memory link"
)]
struct Cli {
    /// Number of connected clients.
    #[arg(long, default_value_t = 4)]
    clients: u32,
    /// Number of asteroids on the server.
    #[arg(long, default_value_t = 64)]
    asteroids: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 600)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Percentage of packets dropped in each direction.
    #[arg(long, default_value_t = 5)]
    loss: u32,
    /// One-way latency in ticks.
    #[arg(long, default_value_t = 3)]
    latency: u32,
    /// Snapshot budget in bytes.
    #[arg(long, default_value_t = 1200)]
    budget: usize,
    /// Relevancy radius around each player's ship; 0 replicates everything.
    #[arg(long, default_value_t = 0.0)]
    relevancy_radius: f32,
    /// Output directory for captures.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
    /// Fail if p95 snapshot size exceeds this value.
    #[arg(long)]
    max_p95_bytes: Option<u64>,
    /// Fail if average snapshot size exceeds this value.
    #[arg(long)]
    max_avg_bytes: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let collection = Arc::new(asteroids_collection().context("build collection")?);
    let layout = ship_command_layout().context("build command layout")?;
    let types = DemoTypes::resolve(&collection)?;
    let config = ReplicationConfig::default();

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;
    write_json(
        &cli.out_dir.join("collection.json"),
        &CaptureSchema::new(&collection, Some(&layout)),
    )?;

    let mut rng = Rng::new(cli.seed);
    let mut server = Server::new(&collection, &layout, &config, &cli, &types, &mut rng)?;
    let mut clients = (0..cli.clients)
        .map(|index| Client::new(index as usize, &collection, &config, cli.seed ^ u64::from(index)))
        .collect::<Vec<_>>();
    connect(&collection, &layout, &mut server, &mut clients)?;

    let mut link = Link::new(cli.clients as usize, cli.loss, cli.latency, cli.seed);
    let mut summary = Summary::new(&cli);

    for tick in 1..=cli.ticks {
        let now = tick * 1000 / TICK_RATE;

        for (index, bytes) in link.commands_arriving(tick) {
            summary.commands_delivered += 1;
            match server.receive_command(index, &bytes, now) {
                Ok(Some(_)) => summary.commands_applied += 1,
                Ok(None) => {}
                Err(err @ ReceiveError::TooManyFaults { .. }) => {
                    return Err(err).context(format!("client {index} command stream"));
                }
                Err(err) => log::warn!("client {index}: bad command packet: {err}"),
            }
        }

        server.step(tick, &types)?;
        let snapshots = server.send(tick, cli.budget, now)?;
        for (index, snapshot) in snapshots.into_iter().enumerate() {
            summary.push_snapshot(&snapshot, &collection);
            if !link.send_snapshot(index, tick, snapshot.bytes) {
                summary.snapshots_dropped += 1;
            }
        }

        for (index, client) in clients.iter_mut().enumerate() {
            for bytes in link.snapshots_arriving(index, tick) {
                let applied = client
                    .apply_snapshot(&bytes, now, &types, &mut summary)
                    .with_context(|| format!("client {index} at tick {tick}"))?;
                validate_applied(&server.world, client, &applied)?;
                if index == 0 {
                    capture(&cli.out_dir, &bytes, &collection, &layout)?;
                }
            }
            if let Some(packet) = client.frame(tick, now, &layout, &types, &mut summary)? {
                if index == 0 {
                    capture(&cli.out_dir, &packet, &collection, &layout)?;
                }
                summary.commands_sent += 1;
                if !link.send_command(index, tick, packet) {
                    summary.commands_dropped += 1;
                }
            }
        }
    }

    for client in &clients {
        summary.client_faults += client.receiver.faults();
        summary.final_rtt_ms.push(client.receiver.ack().estimated_rtt());
        summary.client_ghosts.push(client.receiver.len());
    }
    summary.server_ghosts = server.world.len();
    summary.finalize();
    log::info!(
        "{} snapshots, avg {} bytes, p95 {} bytes, {} skipped ghosts",
        summary.snapshots_sent,
        summary.avg_snapshot_bytes,
        summary.p95_snapshot_bytes,
        summary.ghosts_skipped
    );
    summary.assert_budgets(cli.max_p95_bytes, cli.max_avg_bytes)?;
    write_json(&cli.out_dir.join("summary.json"), &summary)?;
    Ok(())
}

struct DemoTypes {
    ship: GhostTypeId,
    asteroid: GhostTypeId,
    bullet: GhostTypeId,
}

impl DemoTypes {
    fn resolve(collection: &GhostCollection) -> Result<Self> {
        let id = |name: &str| {
            collection
                .id_of(name)
                .with_context(|| format!("collection has no {name} type"))
        };
        Ok(Self {
            ship: id(SHIP)?,
            asteroid: id(ASTEROID)?,
            bullet: id(BULLET)?,
        })
    }
}

/// Handshake RPC context: the hash we expect and the id the peer announced.
struct HandshakeInbox {
    expected: u64,
    accepted: Option<u32>,
}

fn handshake_registry() -> Result<RpcRegistry<HandshakeInbox>> {
    let mut registry = RpcRegistry::new();
    registry.register::<Handshake, _>(|handshake: Handshake, inbox: &mut HandshakeInbox| {
        handshake.verify(inbox.expected)?;
        inbox.accepted = Some(handshake.network_id);
        Ok(())
    })?;
    Ok(registry)
}

/// Server assigns network ids; each client echoes its id back.
fn connect(
    collection: &GhostCollection,
    layout: &CommandLayout,
    server: &mut Server,
    clients: &mut [Client],
) -> Result<()> {
    let registry = handshake_registry()?;
    let model = CompressionModel::default();
    let limits = server.sender.config().limits.clone();
    let hash = collection_hash(collection, Some(layout));

    for (index, client) in clients.iter_mut().enumerate() {
        let network_id = server.connections[index].id().0;
        let mut outgoing = RpcQueue::new();
        outgoing.push(&registry, Handshake { collection_hash: hash, network_id })?;
        let message = outgoing
            .flush(&model, &limits)?
            .context("handshake queue was empty")?;

        let mut inbox = HandshakeInbox {
            expected: hash,
            accepted: None,
        };
        registry.dispatch(&message, &model, &limits, &mut inbox)?;
        let assigned = inbox.accepted.context("handshake carried no id")?;
        client.network_id = i32::try_from(assigned).context("network id out of range")?;

        let mut reply = RpcQueue::new();
        reply.push(&registry, Handshake { collection_hash: hash, network_id: assigned })?;
        let message = reply.flush(&model, &limits)?.context("reply queue was empty")?;
        let mut inbox = HandshakeInbox {
            expected: hash,
            accepted: None,
        };
        registry.dispatch(&message, &model, &limits, &mut inbox)?;
        if inbox.accepted != Some(network_id) {
            bail!("client {index} echoed the wrong network id");
        }
        log::debug!("client {index} connected as {network_id}");
    }
    Ok(())
}

struct Server {
    world: GhostWorld,
    sender: GhostSender,
    connections: Vec<ServerConnection>,
    ships: Vec<(GhostId, ShipState)>,
    asteroids: Vec<(GhostId, AsteroidState)>,
    bullets: Vec<(GhostId, BulletState)>,
    relevancy: bool,
}

impl Server {
    fn new(
        collection: &Arc<GhostCollection>,
        layout: &CommandLayout,
        config: &ReplicationConfig,
        cli: &Cli,
        types: &DemoTypes,
        rng: &mut Rng,
    ) -> Result<Self> {
        let mut world = GhostWorld::new(Arc::clone(collection), config.history_capacity);
        let mut sender = GhostSender::new(config.clone()).with_command_layout(layout.clone());
        let relevancy = cli.relevancy_radius > 0.0;
        if relevancy {
            sender = sender.with_relevancy(SphereRelevancy::new("x", "y", cli.relevancy_radius));
        }

        let mut asteroids = Vec::with_capacity(cli.asteroids as usize);
        for _ in 0..cli.asteroids {
            let id = world.spawn(types.asteroid, None)?;
            let state = AsteroidState::new(
                rng.range_f32(0.0, std::f32::consts::TAU),
                rng.range_f32(-1.0, 1.0),
                [rng.range_f32(0.0, LEVEL_WIDTH), rng.range_f32(0.0, LEVEL_HEIGHT)],
            );
            asteroids.push((id, state));
        }

        let mut connections = Vec::with_capacity(cli.clients as usize);
        let mut ships = Vec::with_capacity(cli.clients as usize);
        for index in 0..cli.clients {
            let conn = ServerConnection::new(ConnectionId(index + 1), config);
            let id = world.spawn(types.ship, Some(conn.id()))?;
            let player = i32::try_from(conn.id().0).context("too many clients")?;
            let position = [rng.range_f32(0.0, LEVEL_WIDTH), rng.range_f32(0.0, LEVEL_HEIGHT)];
            ships.push((id, ShipState::spawn(player, position)));
            connections.push(conn);
        }

        Ok(Self {
            world,
            sender,
            connections,
            ships,
            asteroids,
            bullets: Vec::new(),
            relevancy,
        })
    }

    fn receive_command(
        &mut self,
        index: usize,
        bytes: &[u8],
        now: u32,
    ) -> Result<Option<Tick>, ReceiveError> {
        let Some(conn) = self.connections.get_mut(index) else {
            return Ok(None);
        };
        self.sender.receive_command_packet(conn, bytes, now)
    }

    fn step(&mut self, tick: u32, types: &DemoTypes) -> Result<()> {
        let tick = Tick::new(tick);
        for ((id, ship), conn) in self.ships.iter_mut().zip(&self.connections) {
            let command = conn.command_at(tick);
            let mut input = command
                .map(|command| ShipInput::from_values(&command.values))
                .unwrap_or_default();
            // Repeated input never fires.
            input.shoot &= command.is_some_and(|command| command.tick == tick);
            if let Some(bullet) = step_ship(ship, input, DT) {
                let bullet_id = self.world.spawn(types.bullet, Some(conn.id()))?;
                self.bullets.push((bullet_id, bullet));
            }
            self.world.record(*id, tick, &ship.to_values())?;
        }

        for (id, asteroid) in &mut self.asteroids {
            asteroid.step(DT);
            self.world.record(*id, tick, &asteroid.to_values())?;
        }

        let mut expired = Vec::new();
        self.bullets.retain_mut(|(id, bullet)| {
            let alive = bullet.step(DT);
            if !alive {
                expired.push(*id);
            }
            alive
        });
        for id in expired {
            self.world.despawn(id)?;
        }
        for (id, bullet) in &self.bullets {
            self.world.record(*id, tick, &bullet.to_values())?;
        }

        if self.relevancy {
            for ((_, ship), conn) in self.ships.iter().zip(&mut self.connections) {
                conn.set_focus(Some(Vec2::new(ship.position[0], ship.position[1])));
            }
        }
        Ok(())
    }

    fn send(&mut self, tick: u32, budget: usize, now: u32) -> Result<Vec<OutgoingSnapshot>> {
        let snapshots = self
            .sender
            .build_all_snapshots(&mut self.connections, &self.world, Tick::new(tick), budget, now)
            .into_iter()
            .collect::<Result<Vec<_>, _>>()
            .context("build snapshots")?;
        let released = self.world.release_despawned(&self.connections);
        if released > 0 {
            log::debug!("tick {tick}: released {released} ghost ids");
        }
        Ok(snapshots)
    }
}

struct Client {
    index: usize,
    network_id: i32,
    receiver: GhostReceiver,
    time: NetworkTime,
    commands: CommandBuffer,
    input: ShipInput,
    bot: Rng,
    /// Predicted own-ship position per tick, checked when the server confirms it.
    predicted: BTreeMap<u32, [f32; 2]>,
}

impl Client {
    fn new(index: usize, collection: &Arc<GhostCollection>, config: &ReplicationConfig, seed: u64) -> Self {
        Self {
            index,
            network_id: 0,
            receiver: GhostReceiver::new(Arc::clone(collection), config.clone()),
            time: NetworkTime::new(TimeConfig::default()),
            commands: CommandBuffer::new(config.command_capacity),
            input: ShipInput::default(),
            bot: Rng::new(seed.wrapping_add(0x9E37_79B9)),
            predicted: BTreeMap::new(),
        }
    }

    fn own_ship(&self, types: &DemoTypes) -> Option<GhostId> {
        self.receiver
            .ghosts()
            .find(|ghost| {
                ghost.ty() == types.ship
                    && ghost
                        .latest()
                        .and_then(|record| record.values.first())
                        .is_some_and(|player| *player == self.network_id)
            })
            .map(|ghost| ghost.id())
    }

    fn confirmed_ship(&self, types: &DemoTypes) -> Result<Option<(Tick, ShipState)>> {
        let Some(id) = self.own_ship(types) else {
            return Ok(None);
        };
        let ty = self
            .receiver
            .collection()
            .get(types.ship)
            .context("ship type missing")?;
        let Some(record) = self.receiver.latest(id) else {
            return Ok(None);
        };
        let values = record.copy_from_snapshot(ty)?;
        Ok(ShipState::from_values(&values).map(|ship| (record.tick, ship)))
    }

    fn apply_snapshot(
        &mut self,
        bytes: &[u8],
        now: u32,
        types: &DemoTypes,
        summary: &mut Summary,
    ) -> Result<Vec<replication::AppliedGhost>> {
        let applied = match self.receiver.apply_incoming_snapshot(bytes, now) {
            Ok(applied) => applied,
            Err(err @ ReceiveError::TooManyFaults { .. }) => return Err(err.into()),
            Err(err) => {
                log::warn!("client {}: dropped snapshot: {err}", self.index);
                return Ok(Vec::new());
            }
        };
        if let Some((tick, ship)) = self.confirmed_ship(types)? {
            if let Some(predicted) = self.predicted.remove(&tick.raw()) {
                let dx = predicted[0] - ship.position[0];
                let dy = predicted[1] - ship.position[1];
                summary.push_prediction_error(dx.hypot(dy));
            }
            self.predicted.retain(|predicted, _| *predicted > tick.raw());
        }
        Ok(applied)
    }

    /// Samples input, predicts the own ship and builds this frame's command packet.
    fn frame(
        &mut self,
        tick: u32,
        now: u32,
        layout: &CommandLayout,
        types: &DemoTypes,
        summary: &mut Summary,
    ) -> Result<Option<Vec<u8>>> {
        let ctx = self.time.update(
            self.receiver.last_applied_tick(),
            self.receiver.ack().estimated_rtt(),
        );
        if ctx.predict_tick.is_none() {
            return Ok(None);
        }
        if tick % 30 == 0 {
            self.input = ShipInput {
                left: self.bot.chance(30),
                right: self.bot.chance(30),
                thrust: self.bot.chance(60),
                shoot: false,
            };
        }
        let input = ShipInput {
            shoot: self.bot.chance(5),
            ..self.input
        };
        self.commands
            .add_command_data(CommandData::new(ctx.predict_tick, input.to_values()));

        if let Some((confirmed, mut ship)) = self.confirmed_ship(types)? {
            replay_prediction(
                confirmed,
                ctx.predict_tick,
                &self.commands,
                &mut ship,
                |ship: &mut ShipState, tick: Tick, command: Option<&CommandData>| {
                    let mut input = command
                        .map(|command| ShipInput::from_values(&command.values))
                        .unwrap_or_default();
                    input.shoot &= command.is_some_and(|command| command.tick == tick);
                    let _ = step_ship(ship, input, DT);
                },
            )?;
            self.predicted.insert(ctx.predict_tick.raw(), ship.position);
        }
        summary.interpolated += self.interpolate(&ctx)?;

        let packet = self
            .receiver
            .build_command_packet(&self.commands, layout, ctx.predict_tick, now)?;
        Ok(Some(packet))
    }

    fn interpolate(&self, ctx: &SimulationContext) -> Result<u64> {
        let mut count = 0;
        for ghost in self.receiver.ghosts() {
            if self.receiver.interpolated(ghost.id(), ctx)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Every ghost the client just applied must match the server's record.
fn validate_applied(
    world: &GhostWorld,
    client: &Client,
    applied: &[replication::AppliedGhost],
) -> Result<()> {
    for ghost in applied.iter().filter(|ghost| ghost.kind != ApplyKind::Despawned) {
        let Some(expected) = world
            .get(ghost.id)
            .and_then(|server| server.snapshot_at(ghost.tick))
        else {
            continue;
        };
        let Some(actual) = client.receiver.latest(ghost.id) else {
            bail!("client {} lost ghost {}", client.index, ghost.id.raw());
        };
        if actual.values != expected.values {
            bail!(
                "client {} ghost {} diverged at tick {}",
                client.index,
                ghost.id.raw(),
                ghost.tick.raw()
            );
        }
    }
    Ok(())
}

fn capture(
    out_dir: &Path,
    bytes: &[u8],
    collection: &GhostCollection,
    layout: &CommandLayout,
) -> Result<()> {
    let report = inspect_message(bytes, Some(collection), Some(layout), &wire::Limits::default())
        .context("inspect captured message")?;
    let name = match (report.tick, &report.command) {
        (Some(tick), _) => format!("snapshot_{tick:06}.bin"),
        (None, Some(command)) => format!("command_{:06}.bin", command.tick),
        (None, None) => return Ok(()),
    };
    let path = out_dir.join(name);
    fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

/// In-memory transport with fixed latency and random loss.
struct Link {
    snapshots: Vec<VecDeque<(u32, Vec<u8>)>>,
    commands: Vec<VecDeque<(u32, Vec<u8>)>>,
    loss: u32,
    latency: u32,
    rng: Rng,
}

impl Link {
    fn new(clients: usize, loss: u32, latency: u32, seed: u64) -> Self {
        Self {
            snapshots: vec![VecDeque::new(); clients],
            commands: vec![VecDeque::new(); clients],
            loss,
            latency,
            rng: Rng::new(seed.rotate_left(17)),
        }
    }

    /// Returns `false` when the packet was lost.
    fn send_snapshot(&mut self, client: usize, tick: u32, bytes: Vec<u8>) -> bool {
        if self.rng.chance(self.loss) {
            return false;
        }
        if let Some(queue) = self.snapshots.get_mut(client) {
            queue.push_back((tick + self.latency, bytes));
        }
        true
    }

    fn send_command(&mut self, client: usize, tick: u32, bytes: Vec<u8>) -> bool {
        if self.rng.chance(self.loss) {
            return false;
        }
        if let Some(queue) = self.commands.get_mut(client) {
            queue.push_back((tick + self.latency, bytes));
        }
        true
    }

    fn snapshots_arriving(&mut self, client: usize, tick: u32) -> Vec<Vec<u8>> {
        self.snapshots
            .get_mut(client)
            .map(|queue| drain_due(queue, tick))
            .unwrap_or_default()
    }

    fn commands_arriving(&mut self, tick: u32) -> Vec<(usize, Vec<u8>)> {
        let mut arrived = Vec::new();
        for (client, queue) in self.commands.iter_mut().enumerate() {
            arrived.extend(drain_due(queue, tick).into_iter().map(|bytes| (client, bytes)));
        }
        arrived
    }
}

fn drain_due(queue: &mut VecDeque<(u32, Vec<u8>)>, tick: u32) -> Vec<Vec<u8>> {
    let mut due = Vec::new();
    while queue.front().is_some_and(|(arrive, _)| *arrive <= tick) {
        if let Some((_, bytes)) = queue.pop_front() {
            due.push(bytes);
        }
    }
    due
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        let unit = self.next_u32() as f32 / u32::MAX as f32;
        min + (max - min) * unit
    }

    fn chance(&mut self, percent: u32) -> bool {
        self.next_u32() % 100 < percent
    }
}

#[derive(Debug, Default, Serialize)]
struct TypeSummary {
    updates: u64,
    bits: u64,
}

#[derive(Debug, Serialize)]
struct Summary {
    clients: u32,
    asteroids: u32,
    ticks: u32,
    seed: u64,
    loss_percent: u32,
    latency_ticks: u32,
    budget: usize,
    snapshots_sent: u64,
    snapshots_dropped: u64,
    snapshot_bytes_total: u64,
    avg_snapshot_bytes: u64,
    p95_snapshot_bytes: u64,
    max_snapshot_bytes: u64,
    ghosts_skipped: u64,
    despawns_sent: u64,
    per_type: BTreeMap<String, TypeSummary>,
    commands_sent: u64,
    commands_dropped: u64,
    commands_delivered: u64,
    commands_applied: u64,
    client_faults: u32,
    interpolated: u64,
    prediction_samples: u64,
    prediction_error_avg: f32,
    prediction_error_max: f32,
    final_rtt_ms: Vec<u32>,
    client_ghosts: Vec<usize>,
    server_ghosts: usize,
    #[serde(skip)]
    snapshot_sizes: Vec<u64>,
    #[serde(skip)]
    prediction_error_total: f64,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            clients: cli.clients,
            asteroids: cli.asteroids,
            ticks: cli.ticks,
            seed: cli.seed,
            loss_percent: cli.loss,
            latency_ticks: cli.latency,
            budget: cli.budget,
            snapshots_sent: 0,
            snapshots_dropped: 0,
            snapshot_bytes_total: 0,
            avg_snapshot_bytes: 0,
            p95_snapshot_bytes: 0,
            max_snapshot_bytes: 0,
            ghosts_skipped: 0,
            despawns_sent: 0,
            per_type: BTreeMap::new(),
            commands_sent: 0,
            commands_dropped: 0,
            commands_delivered: 0,
            commands_applied: 0,
            client_faults: 0,
            interpolated: 0,
            prediction_samples: 0,
            prediction_error_avg: 0.0,
            prediction_error_max: 0.0,
            final_rtt_ms: Vec::new(),
            client_ghosts: Vec::new(),
            server_ghosts: 0,
            snapshot_sizes: Vec::new(),
            prediction_error_total: 0.0,
        }
    }

    fn push_snapshot(&mut self, snapshot: &OutgoingSnapshot, collection: &GhostCollection) {
        let bytes = snapshot.bytes.len() as u64;
        self.snapshots_sent += 1;
        self.snapshot_bytes_total += bytes;
        self.snapshot_sizes.push(bytes);
        self.ghosts_skipped += snapshot.stats.skipped as u64;
        self.despawns_sent += snapshot.stats.despawns as u64;
        for (ty, stats) in &snapshot.stats.per_type {
            let name = collection
                .get(*ty)
                .map_or_else(|| format!("type {}", ty.get()), |def| def.name.clone());
            let entry = self.per_type.entry(name).or_default();
            entry.updates += u64::from(stats.count);
            entry.bits += stats.bits;
        }
    }

    fn push_prediction_error(&mut self, error: f32) {
        self.prediction_samples += 1;
        self.prediction_error_total += f64::from(error);
        self.prediction_error_max = self.prediction_error_max.max(error);
    }

    fn finalize(&mut self) {
        if self.snapshots_sent > 0 {
            self.avg_snapshot_bytes = self.snapshot_bytes_total / self.snapshots_sent;
            self.snapshot_sizes.sort_unstable();
            let idx = ((self.snapshot_sizes.len() as f64) * 0.95).ceil() as usize;
            let idx = idx.saturating_sub(1).min(self.snapshot_sizes.len() - 1);
            self.p95_snapshot_bytes = self.snapshot_sizes[idx];
            self.max_snapshot_bytes = self.snapshot_sizes.last().copied().unwrap_or(0);
        }
        if self.prediction_samples > 0 {
            self.prediction_error_avg =
                (self.prediction_error_total / self.prediction_samples as f64) as f32;
        }
    }

    fn assert_budgets(&self, max_p95: Option<u64>, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_p95) = max_p95 {
            if self.p95_snapshot_bytes > max_p95 {
                bail!(
                    "p95 snapshot bytes {} exceeds budget {}",
                    self.p95_snapshot_bytes,
                    max_p95
                );
            }
        }
        if let Some(max_avg) = max_avg {
            if self.avg_snapshot_bytes > max_avg {
                bail!(
                    "avg snapshot bytes {} exceeds budget {}",
                    self.avg_snapshot_bytes,
                    max_avg
                );
            }
        }
        Ok(())
    }
}
