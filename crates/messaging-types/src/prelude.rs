pub use crate::collaborators::{EmailClient, LoggingService, StudyService, UserDirectory};
pub use crate::error::{Error, MessagingResult};
pub use crate::message_store::MessageStore;
pub use crate::types::{
	Account, AutoMessage, AutoMessageType, Condition, ContactInfo, ContactPreferences,
	EmailTemplate, HeaderOverrides, InstanceId, MessageType, OutgoingEmail, ParticipantMessage,
	Profile, ResearcherMessage, SentEmail, StreamUsersFilters, SubscriptionUser, Timestamp,
};

pub use tracing::{debug, debug_span, error, error_span, info, info_span, warn, warn_span};
