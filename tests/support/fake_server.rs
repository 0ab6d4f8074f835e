use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use cycler_sync::remote::{RemoteError, RemoteJob, RemoteServer};

/// In-memory server whose listing can be changed between cycles.
#[derive(Clone)]
pub struct FakeServer {
    label: String,
    listing: Rc<RefCell<Option<Vec<RemoteJob>>>>,
}

impl FakeServer {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            listing: Rc::new(RefCell::new(Some(Vec::new()))),
        }
    }

    pub fn report(&self, jobs: &[(&str, &str)]) {
        *self.listing.borrow_mut() = Some(
            jobs.iter()
                .map(|(id, status)| RemoteJob::new(*id, *status))
                .collect(),
        );
    }

    pub fn go_down(&self) {
        *self.listing.borrow_mut() = None;
    }

    pub fn boxed(&self) -> Box<dyn RemoteServer> {
        Box::new(self.clone())
    }
}

impl RemoteServer for FakeServer {
    fn label(&self) -> &str {
        &self.label
    }

    fn hostname(&self) -> &str {
        "fake.lab"
    }

    fn list_jobs(&self) -> Result<Vec<RemoteJob>, RemoteError> {
        self.listing
            .borrow()
            .clone()
            .ok_or_else(|| RemoteError::Unreachable(self.label.clone()))
    }

    fn snapshot(&self, _job_id_on_server: &str, dest: &Path) -> Result<(), RemoteError> {
        std::fs::create_dir_all(dest).map_err(|source| RemoteError::CreateDir {
            path: dest.to_path_buf(),
            source,
        })
    }
}
