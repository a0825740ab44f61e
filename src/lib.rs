mod config;
pub mod combat;
pub mod mobile;
pub mod net;
pub mod persistence;
pub mod policy;
pub mod telemetry;
pub mod world;

pub use config::{AppConfig, ShardConfig};
pub use mobile::{AccessLevel, Mobile, MobileFlags, MobileKind, Serial};
pub use net::packet::{Packet, PacketReader, PacketWriter};
pub use persistence::cache::{CacheStats, RecordCache};
pub use persistence::serialize::{read_mobile, write_mobile, MobileRecord, SAVE_VERSION};
pub use persistence::store::{SaveStore, SaveValidationReport};
pub use world::delta::DeltaFlags;
pub use world::position::{Direction, Facing, MapId, Point3D};
pub use world::state::World;
pub use world::time::{GameClock, GameTick};

pub fn run(args: &[String]) -> Result<(), String> {
    let app = AppConfig::from_args(args)?;
    telemetry::logging::init(&app.root)?;
    let shard_config = ShardConfig::load_or_default(app.config_path.as_deref())?;
    let tick_ms = shard_config.tick_ms;
    let mut world = World::new(shard_config);

    let store = SaveStore::new(&app.root);
    let load_report = store.load_all(&mut world);
    telemetry::logging::log_game(&format!(
        "world up: mobiles={}, saves={}, recovered={}, errors={}",
        world.mobile_count(),
        load_report.save_files,
        load_report.recovered,
        load_report.errors.len()
    ));

    println!("shard: world load");
    println!("- root: {}", app.root.display());
    println!("- tick: {} ms", tick_ms);
    if load_report.missing_dir {
        println!("- saves: missing saves directory, starting empty");
    } else {
        println!(
            "- saves: files={}, parsed={}, recovered={}, errors={}",
            load_report.save_files,
            load_report.parsed,
            load_report.recovered,
            load_report.errors.len()
        );
    }
    if !load_report.errors.is_empty() {
        for err in &load_report.errors {
            telemetry::logging::log_error(&format!("save load: {}", err));
            eprintln!("shard: save load {}", err);
        }
    }
    println!("- mobiles: {}", world.mobile_count());
    Ok(())
}
