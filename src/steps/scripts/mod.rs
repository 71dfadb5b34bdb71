pub mod s001_create_user;
pub mod s002_create_collection;
pub mod s003_create_indexes;
