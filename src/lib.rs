//! Multi-party chat core - Library exports for testing

pub mod api;
pub mod config;
pub mod core;
pub mod infrastructure;

use crate::config::Settings;
use crate::core::broadcaster::SessionHub;
use crate::core::directory::ChatRoomDirectory;
use crate::core::message_log::ChatMessageLog;
use crate::core::participants::ChatParticipantDirectory;
use crate::core::read_tracker::ChatReadTracker;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::files::DbFileService;
use crate::infrastructure::repositories::{
    DbMembershipRepository, DbMessageRepository, DbParticipantRepository, DbReadStateRepository,
    DbRoomRepository,
};
use di::{Injectable, ServiceCollection};

/// Registers every chat service.
///
/// The database and the session hub are process-wide; the write gate and the broadcast
/// channel only work if every request shares them.
pub fn services() -> ServiceCollection {
    let mut services = ServiceCollection::new();
    services
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(SessionHub::singleton())
        .add(DbParticipantRepository::transient())
        .add(DbRoomRepository::transient())
        .add(DbMembershipRepository::transient())
        .add(DbMessageRepository::transient())
        .add(DbReadStateRepository::transient())
        .add(DbFileService::transient())
        .add(ChatParticipantDirectory::scoped())
        .add(ChatRoomDirectory::scoped())
        .add(ChatMessageLog::scoped())
        .add(ChatReadTracker::scoped());
    services
}
