//! In-process database used by the unit tests. It records every call and can
//! be told to fail at any phase.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::{Connection, Connector, DbError, Endpoint, InsertStatement, MetricRow, Transaction};

#[derive(Debug, Default)]
pub struct MemoryState {
    pub connects: usize,
    pub begins: usize,
    pub prepared: Vec<String>,
    pub executes: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Rows that made it through a successful commit.
    pub rows: Vec<MetricRow>,
}

#[derive(Debug, Default, Clone)]
struct Faults {
    connect: bool,
    begin: bool,
    prepare: bool,
    /// 1-based index of the execute call that fails.
    execute_at: Option<usize>,
    commit: bool,
}

#[derive(Debug, Default, Clone)]
pub struct MemoryDatabase {
    state: Arc<Mutex<MemoryState>>,
    faults: Faults,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_connect(mut self) -> Self {
        self.faults.connect = true;
        self
    }

    pub fn failing_begin(mut self) -> Self {
        self.faults.begin = true;
        self
    }

    pub fn failing_prepare(mut self) -> Self {
        self.faults.prepare = true;
        self
    }

    pub fn failing_execute_at(mut self, k: usize) -> Self {
        self.faults.execute_at = Some(k);
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.faults.commit = true;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().expect("memory state poisoned")
    }
}

pub struct MemoryTransaction {
    db: MemoryDatabase,
    statement: Option<String>,
    pending: Vec<MetricRow>,
    done: bool,
}

#[async_trait]
impl Connector for MemoryDatabase {
    type Connection = MemoryDatabase;

    async fn connect(&self, _endpoint: &Endpoint) -> Result<MemoryDatabase, DbError> {
        self.state().connects += 1;
        if self.faults.connect {
            return Err(DbError::Rejected("connection refused".into()));
        }
        Ok(self.clone())
    }
}

#[async_trait]
impl Connection for MemoryDatabase {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, DbError> {
        self.state().begins += 1;
        if self.faults.begin {
            return Err(DbError::Rejected("cannot begin".into()));
        }
        Ok(MemoryTransaction {
            db: self.clone(),
            statement: None,
            pending: Vec::new(),
            done: false,
        })
    }
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn prepare(&mut self, statement: &InsertStatement) -> Result<(), DbError> {
        if self.db.faults.prepare {
            return Err(DbError::Rejected("unknown table".into()));
        }
        let sql = statement.to_string();
        self.db.state().prepared.push(sql.clone());
        self.statement = Some(sql);
        Ok(())
    }

    async fn execute(&mut self, row: &MetricRow) -> Result<(), DbError> {
        if self.statement.is_none() {
            return Err(DbError::NotPrepared);
        }
        let n = {
            let mut state = self.db.state();
            state.executes += 1;
            state.executes
        };
        if self.db.faults.execute_at == Some(n) {
            return Err(DbError::Rejected(format!("insert {} rejected", n)));
        }
        self.pending.push(row.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), DbError> {
        self.done = true;
        let mut state = self.db.state();
        state.commits += 1;
        if self.db.faults.commit {
            state.rollbacks += 1;
            return Err(DbError::Rejected("commit failed".into()));
        }
        state.rows.append(&mut self.pending);
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.done {
            self.db.state().rollbacks += 1;
        }
    }
}
