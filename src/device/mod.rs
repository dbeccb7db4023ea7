mod ua_parser;

pub use ua_parser::{classify_user_agent, truncate_user_agent, MAX_USER_AGENT_LEN};
