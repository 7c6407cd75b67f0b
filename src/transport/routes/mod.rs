pub mod connections;
pub mod stats;

pub use connections::get_players;
pub use stats::{collect_stats, get_info, get_stats, get_version};
