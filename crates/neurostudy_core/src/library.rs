//! crates/neurostudy_core/src/library.rs
//!
//! The in-memory study library: the folder tree, the studies inside it, and
//! every user-driven mutation over them. Callers persist a `snapshot()` after
//! each mutation.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::{
    new_id, CheckpointPatch, DataSet, Flashcard, Folder, QuizQuestion, SlideContent, StudyGuide,
    StudyMode, StudySession, StudySource, ROOT_FOLDER_ID,
};
use crate::ports::{PortError, PortResult};
use crate::review;

/// Folders, studies and the currently open study.
#[derive(Debug, Clone, Default)]
pub struct StudyLibrary {
    studies: Vec<StudySession>,
    folders: Vec<Folder>,
    active_study_id: Option<String>,
}

/// What a cascading folder delete removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletedSubtree {
    pub folder_ids: Vec<String>,
    pub study_ids: Vec<String>,
}

fn study_not_found(study_id: &str) -> PortError {
    PortError::NotFound(format!("Study {} not found", study_id))
}

fn folder_not_found(folder_id: &str) -> PortError {
    PortError::NotFound(format!("Folder {} not found", folder_id))
}

impl StudyLibrary {
    pub fn from_data(data: DataSet) -> Self {
        Self {
            studies: data.studies,
            folders: data.folders,
            active_study_id: None,
        }
    }

    /// Replaces the collections, keeping the active study only if it still exists.
    pub fn replace_data(&mut self, data: DataSet) {
        self.studies = data.studies;
        self.folders = data.folders;
        if let Some(active) = &self.active_study_id {
            if !self.studies.iter().any(|s| &s.id == active) {
                self.active_study_id = None;
            }
        }
    }

    /// A copy of the persisted collections.
    pub fn snapshot(&self) -> DataSet {
        DataSet {
            studies: self.studies.clone(),
            folders: self.folders.clone(),
        }
    }

    pub fn studies(&self) -> &[StudySession] {
        &self.studies
    }

    pub fn folders(&self) -> &[Folder] {
        &self.folders
    }

    pub fn active_study_id(&self) -> Option<&str> {
        self.active_study_id.as_deref()
    }

    pub fn study(&self, study_id: &str) -> PortResult<&StudySession> {
        self.studies
            .iter()
            .find(|s| s.id == study_id)
            .ok_or_else(|| study_not_found(study_id))
    }

    fn study_mut(&mut self, study_id: &str) -> PortResult<&mut StudySession> {
        self.studies
            .iter_mut()
            .find(|s| s.id == study_id)
            .ok_or_else(|| study_not_found(study_id))
    }

    pub fn folder(&self, folder_id: &str) -> PortResult<&Folder> {
        self.folders
            .iter()
            .find(|f| f.id == folder_id)
            .ok_or_else(|| folder_not_found(folder_id))
    }

    /// The root sentinel is always a valid container.
    fn ensure_container(&self, folder_id: &str) -> PortResult<()> {
        if folder_id == ROOT_FOLDER_ID {
            return Ok(());
        }
        self.folder(folder_id).map(|_| ())
    }

    //=====================================================================================
    // Folders
    //=====================================================================================

    pub fn create_folder(&mut self, name: &str, parent_id: Option<&str>) -> PortResult<Folder> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::InvalidInput("Folder name cannot be empty".to_string()));
        }
        let parent = parent_id.unwrap_or(ROOT_FOLDER_ID);
        self.ensure_container(parent)?;

        let folder = Folder {
            id: new_id(),
            name: name.to_string(),
            parent_id: Some(parent.to_string()),
        };
        self.folders.push(folder.clone());
        Ok(folder)
    }

    pub fn rename_folder(&mut self, folder_id: &str, name: &str) -> PortResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::InvalidInput("Folder name cannot be empty".to_string()));
        }
        let folder = self
            .folders
            .iter_mut()
            .find(|f| f.id == folder_id)
            .ok_or_else(|| folder_not_found(folder_id))?;
        folder.name = name.to_string();
        Ok(())
    }

    /// Reparents a folder. Moving a folder into itself or one of its descendants is rejected.
    pub fn move_folder(&mut self, folder_id: &str, new_parent_id: Option<&str>) -> PortResult<()> {
        self.folder(folder_id)?;
        let parent = new_parent_id.unwrap_or(ROOT_FOLDER_ID);
        self.ensure_container(parent)?;

        if parent != ROOT_FOLDER_ID && self.descendant_folder_ids(folder_id).contains(parent) {
            return Err(PortError::InvalidInput(format!(
                "Cannot move folder {} into its own subtree",
                folder_id
            )));
        }

        if let Some(folder) = self.folders.iter_mut().find(|f| f.id == folder_id) {
            folder.parent_id = Some(parent.to_string());
        }
        Ok(())
    }

    /// The folder itself plus every folder below it.
    pub fn descendant_folder_ids(&self, folder_id: &str) -> HashSet<String> {
        let mut found = HashSet::from([folder_id.to_string()]);
        let mut frontier = vec![folder_id.to_string()];

        while let Some(current) = frontier.pop() {
            for child in &self.folders {
                if child.parent_id.as_deref() == Some(current.as_str()) && found.insert(child.id.clone()) {
                    frontier.push(child.id.clone());
                }
            }
        }
        found
    }

    /// Deletes a folder, its descendant folders and every study inside the subtree.
    pub fn delete_folder(&mut self, folder_id: &str) -> PortResult<DeletedSubtree> {
        self.folder(folder_id)?;
        let subtree = self.descendant_folder_ids(folder_id);

        let mut deleted = DeletedSubtree::default();
        self.folders.retain(|f| {
            let doomed = subtree.contains(&f.id);
            if doomed {
                deleted.folder_ids.push(f.id.clone());
            }
            !doomed
        });
        self.studies.retain(|s| {
            let doomed = subtree.contains(&s.folder_id);
            if doomed {
                deleted.study_ids.push(s.id.clone());
            }
            !doomed
        });

        if let Some(active) = &self.active_study_id {
            if deleted.study_ids.contains(active) {
                self.active_study_id = None;
            }
        }
        debug!(
            "Deleted folder {} with {} folders and {} studies",
            folder_id,
            deleted.folder_ids.len(),
            deleted.study_ids.len()
        );
        Ok(deleted)
    }

    //=====================================================================================
    // Studies
    //=====================================================================================

    pub fn create_study(
        &mut self,
        title: &str,
        folder_id: Option<&str>,
        mode: StudyMode,
        is_book: bool,
    ) -> PortResult<StudySession> {
        let folder = folder_id.unwrap_or(ROOT_FOLDER_ID);
        self.ensure_container(folder)?;
        let title = match title.trim() {
            "" => "Untitled Study",
            t => t,
        };
        let study = StudySession::new(folder, title, mode, is_book);
        self.studies.push(study.clone());
        Ok(study)
    }

    pub fn rename_study(&mut self, study_id: &str, title: &str) -> PortResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(PortError::InvalidInput("Study title cannot be empty".to_string()));
        }
        let study = self.study_mut(study_id)?;
        study.title = title.to_string();
        study.touch();
        Ok(())
    }

    pub fn move_study(&mut self, study_id: &str, folder_id: Option<&str>) -> PortResult<()> {
        let folder = folder_id.unwrap_or(ROOT_FOLDER_ID).to_string();
        self.ensure_container(&folder)?;
        let study = self.study_mut(study_id)?;
        study.folder_id = folder;
        study.touch();
        Ok(())
    }

    pub fn set_mode(&mut self, study_id: &str, mode: StudyMode, is_book: bool) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.mode = mode;
        study.is_book = is_book;
        study.touch();
        Ok(())
    }

    pub fn delete_study(&mut self, study_id: &str) -> PortResult<()> {
        let before = self.studies.len();
        self.studies.retain(|s| s.id != study_id);
        if self.studies.len() == before {
            return Err(study_not_found(study_id));
        }
        if self.active_study_id.as_deref() == Some(study_id) {
            self.active_study_id = None;
        }
        Ok(())
    }

    /// Opens a study, or clears the selection with `None`.
    pub fn set_active_study(&mut self, study_id: Option<&str>) -> PortResult<()> {
        if let Some(id) = study_id {
            self.study(id)?;
        }
        self.active_study_id = study_id.map(str::to_string);
        Ok(())
    }

    //=====================================================================================
    // Sources
    //=====================================================================================

    pub fn add_source(&mut self, study_id: &str, source: StudySource) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.sources.push(source);
        study.touch();
        Ok(())
    }

    pub fn rename_source(&mut self, study_id: &str, source_id: &str, name: &str) -> PortResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PortError::InvalidInput("Source name cannot be empty".to_string()));
        }
        let study = self.study_mut(study_id)?;
        let source = study
            .sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| PortError::NotFound(format!("Source {} not found", source_id)))?;
        source.name = name.to_string();
        study.touch();
        Ok(())
    }

    pub fn remove_source(&mut self, study_id: &str, source_id: &str) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        let before = study.sources.len();
        study.sources.retain(|s| s.id != source_id);
        if study.sources.len() == before {
            return Err(PortError::NotFound(format!("Source {} not found", source_id)));
        }
        study.touch();
        Ok(())
    }

    //=====================================================================================
    // Generated Artifacts
    //=====================================================================================

    pub fn set_guide(&mut self, study_id: &str, guide: StudyGuide) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.guide = Some(guide);
        study.touch();
        Ok(())
    }

    pub fn set_slides(&mut self, study_id: &str, slides: Vec<SlideContent>) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.slides = slides;
        study.touch();
        Ok(())
    }

    pub fn set_quiz(&mut self, study_id: &str, quiz: Vec<QuizQuestion>) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.quiz = quiz;
        study.touch();
        Ok(())
    }

    pub fn set_flashcards(&mut self, study_id: &str, flashcards: Vec<Flashcard>) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        study.flashcards = flashcards;
        study.touch();
        Ok(())
    }

    fn checkpoint_mut<'a>(
        study: &'a mut StudySession,
        checkpoint_id: &str,
    ) -> PortResult<&'a mut crate::domain::Checkpoint> {
        let study_id = study.id.clone();
        study
            .guide
            .as_mut()
            .ok_or_else(|| PortError::NotFound(format!("Study {} has no guide yet", study_id)))?
            .checkpoints
            .iter_mut()
            .find(|c| c.id == checkpoint_id)
            .ok_or_else(|| PortError::NotFound(format!("Checkpoint {} not found", checkpoint_id)))
    }

    /// Flips a checkpoint's completion flag and returns the new value.
    pub fn toggle_checkpoint(&mut self, study_id: &str, checkpoint_id: &str) -> PortResult<bool> {
        let study = self.study_mut(study_id)?;
        let checkpoint = Self::checkpoint_mut(study, checkpoint_id)?;
        checkpoint.completed = !checkpoint.completed;
        let completed = checkpoint.completed;
        study.touch();
        Ok(completed)
    }

    pub fn update_checkpoint(
        &mut self,
        study_id: &str,
        checkpoint_id: &str,
        patch: CheckpointPatch,
    ) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        Self::checkpoint_mut(study, checkpoint_id)?.apply_patch(patch);
        study.touch();
        Ok(())
    }

    pub fn set_checkpoint_diagram(
        &mut self,
        study_id: &str,
        checkpoint_id: &str,
        diagram: String,
    ) -> PortResult<()> {
        let study = self.study_mut(study_id)?;
        Self::checkpoint_mut(study, checkpoint_id)?.diagram = Some(diagram);
        study.touch();
        Ok(())
    }

    //=====================================================================================
    // Reviews
    //=====================================================================================

    pub fn record_review(&mut self, study_id: &str, now: DateTime<Utc>) -> PortResult<StudySession> {
        let study = self.study_mut(study_id)?;
        review::record_review(study, now);
        study.touch();
        Ok(study.clone())
    }

    pub fn due_for_review(&self, now: DateTime<Utc>) -> Vec<&StudySession> {
        self.studies.iter().filter(|s| review::is_due(s, now)).collect()
    }
}
