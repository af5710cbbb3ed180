mod identifiers;

pub use identifiers::{is_valid_id, AgentName, PatternId, StageName, SwarmId, MAX_ID_LEN};
