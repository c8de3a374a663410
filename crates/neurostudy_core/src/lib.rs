pub mod domain;
pub mod generation;
pub mod library;
pub mod memory;
pub mod persistence;
pub mod ports;
pub mod retry;
pub mod review;

pub use domain::{
    AccessRole, ChatMessage, ChatRole, Checkpoint, CheckpointPatch, DataSet, Flashcard, Folder,
    QuizQuestion, SlideContent, SourceType, StudyGuide, StudyMode, StudySession, StudySource,
    UploadedFile, ROOT_FOLDER_ID,
};
pub use library::{DeletedSubtree, StudyLibrary};
pub use persistence::{PersistenceGateway, SyncPolicy};
pub use ports::{
    ContentGenerationService, FileUploadService, GuideRequest, LocalStore, PortError, PortResult,
    RemoteRow, RemoteStore,
};
pub use retry::RetryPolicy;
