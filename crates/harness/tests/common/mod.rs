//! Shared test doubles: an in-process Connection adapter that records
//! every executed statement and answers with canned rendered output.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use regatta_harness::{Connection, Connector, Error, Result};

#[derive(Default)]
pub struct ScriptedConnector {
    pub executed: Arc<Mutex<Vec<String>>>,
    /// When set, every connect attempt fails as if the server were
    /// unreachable.
    pub refuse: bool,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, addr: &str, _namespace: Option<&str>) -> Result<Box<dyn Connection>> {
        if self.refuse {
            return Err(Error::Connect {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        Ok(Box::new(ScriptedConnection {
            executed: self.executed.clone(),
        }))
    }
}

pub struct ScriptedConnection {
    executed: Arc<Mutex<Vec<String>>>,
}

impl Connection for ScriptedConnection {
    fn execute(&mut self, statement: &str) -> Result<String> {
        if statement.contains("BOOM") {
            return Err(Error::Transport("connection reset by peer".into()));
        }
        self.executed.lock().unwrap().push(statement.to_string());
        if statement.trim_start().to_uppercase().starts_with("SELECT") {
            Ok("  pk | v\n  1  | x\n".to_string())
        } else {
            Ok("  OK\n".to_string())
        }
    }

    fn close(&mut self) {}
}
