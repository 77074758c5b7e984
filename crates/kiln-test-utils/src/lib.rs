//! Testing utilities for the Kiln workspace
//!
//! Shared fixtures (the `user` / `todo` application) and [`ScriptedWork`], a
//! unit of work that records every call and can be told to fail, panic or
//! sleep for chosen nodes.

#![allow(missing_docs)]

use kiln_contract::{AppManifest, ServiceDecl};
use kiln_kernel::{UnitOfWork, WorkAction, WorkOutput, WorkRequest};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

pub const USER_CONTRACT: &str = r#"version: "1.0"
service:
  name: user
  description: Manages user accounts
api:
  base_path: /api/v1
  endpoints:
    - id: create_user
      method: POST
      path: /users
      request:
        name: { type: string, required: true }
        email: { type: string, required: true }
      response: { type: User }
    - id: get_user
      method: GET
      path: /users/{id}
      response: { type: User }
    - id: list_users
      method: GET
      path: /users
      response: { type: UserList }
types:
  User:
    fields: { id: string, name: string, email: string }
  UserList:
    fields: { items: "User[]" }
"#;

/// `user` without `GET /users/{id}`
pub const USER_CONTRACT_WITHOUT_GET: &str = r#"version: "1.0"
service:
  name: user
  description: Manages user accounts
api:
  base_path: /api/v1
  endpoints:
    - id: create_user
      method: POST
      path: /users
      request:
        name: { type: string, required: true }
        email: { type: string, required: true }
      response: { type: User }
    - id: list_users
      method: GET
      path: /users
      response: { type: UserList }
types:
  User:
    fields: { id: string, name: string, email: string }
  UserList:
    fields: { items: "User[]" }
"#;

/// `user` with an extra search operation
pub const USER_CONTRACT_WITH_SEARCH: &str = r#"version: "1.0"
service:
  name: user
  description: Manages user accounts
api:
  base_path: /api/v1
  endpoints:
    - id: create_user
      method: POST
      path: /users
      request:
        name: { type: string, required: true }
        email: { type: string, required: true }
      response: { type: User }
    - id: get_user
      method: GET
      path: /users/{id}
      response: { type: User }
    - id: list_users
      method: GET
      path: /users
      response: { type: UserList }
    - id: search_users
      method: GET
      path: /users/search
      request:
        query: { type: string }
      response: { type: UserList }
types:
  User:
    fields: { id: string, name: string, email: string }
  UserList:
    fields: { items: "User[]" }
"#;

/// `user` with only its description changed
pub const USER_CONTRACT_REWORDED: &str = r#"version: "1.0"
service:
  name: user
  description: Owns user accounts and profiles
api:
  base_path: /api/v1
  endpoints:
    - id: create_user
      method: POST
      path: /users
      request:
        name: { type: string, required: true }
        email: { type: string, required: true }
      response: { type: User }
    - id: get_user
      method: GET
      path: /users/{id}
      response: { type: User }
    - id: list_users
      method: GET
      path: /users
      response: { type: UserList }
types:
  User:
    fields: { id: string, name: string, email: string }
  UserList:
    fields: { items: "User[]" }
"#;

pub const TODO_CONTRACT: &str = r#"version: "1.0"
service:
  name: todo
  description: Tracks todo items per user
api:
  base_path: /api/v1
  endpoints:
    - id: create_todo
      method: POST
      path: /todos
      request:
        title: { type: string, required: true }
        user_id: { type: string, required: true }
      response: { type: Todo }
    - id: list_todos
      method: GET
      path: /todos
      response: { type: TodoList }
types:
  Todo:
    fields: { id: string, title: string, user_id: string, done: bool }
  TodoList:
    fields: { items: "Todo[]" }
dependencies:
  services:
    - name: user
      reason: validates todo owners
"#;

pub const TODO_APP_MANIFEST: &str = r#"version: "1"
app:
  name: todo-app
  description: Users and their todo lists
services:
  - name: user
    contract: user.contract.yaml
    runtime:
      type: container
      port: 8081
  - name: todo
    contract: todo.contract.yaml
    dependencies: [user]
    runtime:
      type: container
      port: 8082
"#;

/// `{user, todo -> user}`
pub fn todo_app_manifest() -> AppManifest {
    AppManifest::new("todo-app")
        .with_service(ServiceDecl::new("user", "user.contract.yaml").with_port(8081))
        .with_service(
            ServiceDecl::new("todo", "todo.contract.yaml")
                .depends_on("user")
                .with_port(8082),
        )
}

/// Contract reference to contract text for [`todo_app_manifest`]
pub fn todo_app_contracts() -> Vec<(String, String)> {
    vec![
        ("user.contract.yaml".to_string(), USER_CONTRACT.to_string()),
        ("todo.contract.yaml".to_string(), TODO_CONTRACT.to_string()),
    ]
}

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub node: String,
    pub wave: usize,
    pub action: WorkAction,
    /// Nodes that had finished when this call started
    pub finished_before: HashSet<String>,
}

#[derive(Debug, Default)]
struct Ledger {
    calls: Vec<CallRecord>,
    finished: HashSet<String>,
    in_flight: usize,
    peak_in_flight: usize,
}

/// Unit of work driven by a script
#[derive(Debug, Default)]
pub struct ScriptedWork {
    failures: HashMap<String, String>,
    panics: HashSet<String>,
    delays: HashMap<String, Duration>,
    ledger: Mutex<Ledger>,
}

impl ScriptedWork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the named node with `cause`
    #[must_use]
    pub fn fail(mut self, node: impl Into<String>, cause: impl Into<String>) -> Self {
        self.failures.insert(node.into(), cause.into());
        self
    }

    /// Panic inside the named node
    #[must_use]
    pub fn panic_on(mut self, node: impl Into<String>) -> Self {
        self.panics.insert(node.into());
        self
    }

    /// Sleep before finishing the named node
    #[must_use]
    pub fn delay(mut self, node: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(node.into(), delay);
        self
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.ledger.lock().calls.clone()
    }

    pub fn call(&self, node: &str) -> Option<CallRecord> {
        self.ledger.lock().calls.iter().find(|c| c.node == node).cloned()
    }

    pub fn was_called(&self, node: &str) -> bool {
        self.call(node).is_some()
    }

    pub fn call_count(&self) -> usize {
        self.ledger.lock().calls.len()
    }

    /// Highest number of calls that were running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.ledger.lock().peak_in_flight
    }

    pub fn finished(&self) -> HashSet<String> {
        self.ledger.lock().finished.clone()
    }
}

#[async_trait::async_trait]
impl UnitOfWork for ScriptedWork {
    async fn perform(&self, request: WorkRequest) -> anyhow::Result<WorkOutput> {
        let node = request.node.name.clone();
        {
            let mut ledger = self.ledger.lock();
            let finished_before = ledger.finished.clone();
            ledger.calls.push(CallRecord {
                node: node.clone(),
                wave: request.wave,
                action: request.action,
                finished_before,
            });
            ledger.in_flight += 1;
            ledger.peak_in_flight = ledger.peak_in_flight.max(ledger.in_flight);
        }

        if let Some(delay) = self.delays.get(&node) {
            tokio::time::sleep(*delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        {
            let mut ledger = self.ledger.lock();
            ledger.in_flight -= 1;
            ledger.finished.insert(node.clone());
        }

        if self.panics.contains(&node) {
            panic!("scripted panic in {node}");
        }
        if let Some(cause) = self.failures.get(&node) {
            anyhow::bail!("{cause}");
        }
        Ok(WorkOutput::new(format!("{} {node}", request.action))
            .with_artifact(format!("{node}/main.rs")))
    }
}
