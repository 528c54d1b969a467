/*!
Session lifecycle management.

A session is a named, persistable instance of a routing topology. The
manager drives each one through its phases:

```text
created -> starting -> active -> stopping -> stopped
   |           |                                 |
   |           v                                 v
   +------> error <------ (start failure)     (resume)
```

Records are JSON files, one per session id, written atomically by the
[`SessionStore`]. Templates seed new sessions with prewired topologies.

# Quick start

```no_run
use patchbay::session::{SessionManager, SessionOptions, SessionStore};

# async fn demo() -> Result<(), Box<dyn std::error::Error>> {
let manager = SessionManager::new(SessionStore::from_env());
let session = manager
    .create_session("ensemble", Some("multi-model-ensemble"), SessionOptions::default())
    .await?;
manager.start_session(&session.id).await?;
# Ok(())
# }
```
*/

mod manager;
mod model;
mod store;
mod templates;
mod tests;

pub use manager::{SessionError, SessionManager};
pub use model::{NodeStatus, Session, SessionOptions, SessionPhase, SessionStats, SessionStatus};
pub use store::{DIR_ENV_VAR, PersistenceError, SessionStore};
pub use templates::{Template, TemplateRegistry};
