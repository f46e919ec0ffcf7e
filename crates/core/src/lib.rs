pub mod bank;
pub mod clock;
pub mod error;
pub mod progression;
pub mod question;
pub mod session;
pub mod tutor;

pub use bank::{QuestionBank, StaticQuestionBank};
pub use error::QuizError;
pub use session::{SessionHandle, SessionOrchestrator, SessionSettings, SessionSnapshot};
pub use tutor::TutorCoordinator;
