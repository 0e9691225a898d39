// Application state for HTTP handlers
use std::sync::Arc;

use crate::application::lab_service::LabService;
use crate::application::notes::NoteStore;
use crate::application::tutor::TutorService;

#[derive(Clone)]
pub struct AppState {
    pub lab: LabService,
    pub tutor: TutorService,
    pub notes: Arc<dyn NoteStore>,
}
