use super::error::StoreError;
use super::store::{
    ElementWrite, HashElement, Key, KeyType, ListElement, ListPosition, ScanPage, SetElement,
    StoreClient,
};
use super::value_format::render_value;
use crate::config::ConnectionProfile;
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, Client, Value};
use uuid::Uuid;

const LIST_TOMBSTONE_PREFIX: &str = "__redis_explorer_deleted__";

/// Placeholder written over a list element right before `LREM` removes it.
/// Unique per call, so `LREM` can only ever hit the slot that was just overwritten.
fn list_tombstone(index: i64) -> String {
    format!("{}:{}:{}", LIST_TOMBSTONE_PREFIX, index, Uuid::new_v4())
}

/// [`StoreClient`] over one multiplexed connection; every call works on a clone of it.
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    pub async fn connect(profile: &ConnectionProfile) -> Result<Self, StoreError> {
        log::info!("connecting to {} ({})...", profile.name, profile.url);
        let client = Client::open(profile.url.as_str())
            .map_err(|e| StoreError::Connection(format!("{}: {}", profile.name, e)))?;
        let mut connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", profile.name, e)))?;
        let db_index = profile.db.unwrap_or(0);
        redis::cmd("SELECT")
            .arg(db_index)
            .query_async::<()>(&mut connection)
            .await?;
        log::info!("connected to {} ({}), DB {}", profile.name, profile.url, db_index);
        Ok(Self { connection })
    }

    fn con(&self) -> MultiplexedConnection {
        self.connection.clone()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let count = redis::cmd("EXISTS")
            .arg(key)
            .query_async::<i64>(&mut self.con())
            .await?;
        Ok(count > 0)
    }

    async fn require(&self, key: &str) -> Result<(), StoreError> {
        if self.exists(key).await? {
            Ok(())
        } else {
            Err(StoreError::KeyNotFound(key.to_string()))
        }
    }

    async fn refuse_existing(&self, key: &str) -> Result<(), StoreError> {
        if self.exists(key).await? {
            Err(StoreError::KeyExists(key.to_string()))
        } else {
            Ok(())
        }
    }

    /// One pipelined `TYPE` per key; keys of types without an editor are dropped.
    async fn resolve_types(&self, names: Vec<String>) -> Result<Vec<Key>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for name in &names {
            pipe.cmd("TYPE").arg(name);
        }
        let types = pipe.query_async::<Vec<String>>(&mut self.con()).await?;
        Ok(names
            .into_iter()
            .zip(types)
            .filter_map(|(name, type_name)| KeyType::parse(&type_name).map(|t| Key::new(name, t)))
            .collect())
    }
}

fn list_error(key: &str, index: i64, e: redis::RedisError) -> StoreError {
    classify_list_reply(key, index, &e.to_string()).unwrap_or(StoreError::Client(e))
}

/// Maps the `LSET` failures that mean "gone" onto not-found errors.
fn classify_list_reply(key: &str, index: i64, message: &str) -> Option<StoreError> {
    let message = message.to_ascii_lowercase();
    if message.contains("no such key") {
        Some(StoreError::KeyNotFound(key.to_string()))
    } else if message.contains("index out of range") {
        Some(StoreError::ElementNotFound {
            key: key.to_string(),
            element: index.to_string(),
        })
    } else {
        None
    }
}

fn require_payload<T>(items: &[T], what: &str) -> Result<(), StoreError> {
    if items.is_empty() {
        Err(StoreError::InvalidInput(format!("a new {} needs at least one element", what)))
    } else {
        Ok(())
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn scan_keys(
        &self,
        cursor: u64,
        count: usize,
        key_type: Option<KeyType>,
        pattern: Option<&str>,
    ) -> Result<ScanPage<Key>, StoreError> {
        let mut con = self.con();
        let mut cmd = redis::cmd("SCAN");
        cmd.arg(cursor)
            .arg("MATCH")
            .arg(pattern.unwrap_or("*"))
            .arg("COUNT")
            .arg(count);
        if let Some(key_type) = key_type {
            cmd.arg("TYPE").arg(key_type.as_str());
        }
        let (next, names) = cmd.query_async::<(u64, Vec<String>)>(&mut con).await?;
        let items = match key_type {
            Some(key_type) => names.into_iter().map(|name| Key::new(name, key_type)).collect(),
            None => self.resolve_types(names).await?,
        };
        let total = redis::cmd("DBSIZE").query_async::<u64>(&mut con).await?;
        Ok(ScanPage {
            cursor: next,
            total,
            items,
        })
    }

    async fn delete_key(&self, key: &str) -> Result<bool, StoreError> {
        let count = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut self.con())
            .await?;
        Ok(count > 0)
    }

    async fn get_string(&self, key: &str) -> Result<String, StoreError> {
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut self.con())
            .await?
            .ok_or_else(|| StoreError::KeyNotFound(key.to_string()))
    }

    async fn set_string(&self, key: &str, value: &str) -> Result<String, StoreError> {
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("XX")
            .query_async::<Option<String>>(&mut self.con())
            .await?;
        match reply {
            Some(_) => Ok(value.to_string()),
            None => Err(StoreError::KeyNotFound(key.to_string())),
        }
    }

    async fn scan_hash(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<HashElement>, StoreError> {
        let mut con = self.con();
        let (next, flat) = redis::cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern.unwrap_or("*"))
            .arg("COUNT")
            .arg(count)
            .query_async::<(u64, Vec<String>)>(&mut con)
            .await?;
        let items = flat
            .chunks_exact(2)
            .map(|pair| HashElement::new(pair[0].clone(), pair[1].clone()))
            .collect();
        let total = redis::cmd("HLEN").arg(key).query_async::<u64>(&mut con).await?;
        Ok(ScanPage {
            cursor: next,
            total,
            items,
        })
    }

    async fn scan_list(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        index: Option<i64>,
    ) -> Result<ScanPage<ListElement>, StoreError> {
        let mut con = self.con();
        let total = redis::cmd("LLEN").arg(key).query_async::<u64>(&mut con).await?;

        if let Some(index) = index {
            let resolved = if index < 0 { total as i64 + index } else { index };
            let mut items = Vec::new();
            if resolved >= 0 && (resolved as u64) < total {
                let value = redis::cmd("LINDEX")
                    .arg(key)
                    .arg(resolved)
                    .query_async::<Option<String>>(&mut con)
                    .await?;
                if let Some(value) = value {
                    items.push(ListElement::new(resolved, value));
                }
            }
            return Ok(ScanPage {
                cursor: 0,
                total,
                items,
            });
        }

        let count = count.max(1) as u64;
        let stop = cursor + count - 1;
        let values = redis::cmd("LRANGE")
            .arg(key)
            .arg(cursor)
            .arg(stop)
            .query_async::<Vec<String>>(&mut con)
            .await?;
        let items = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| ListElement::new((cursor + offset as u64) as i64, value))
            .collect();
        let next = cursor + count;
        Ok(ScanPage {
            cursor: if next >= total { 0 } else { next },
            total,
            items,
        })
    }

    async fn scan_set(
        &self,
        key: &str,
        cursor: u64,
        count: usize,
        pattern: Option<&str>,
    ) -> Result<ScanPage<SetElement>, StoreError> {
        let mut con = self.con();
        let (next, members) = redis::cmd("SSCAN")
            .arg(key)
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern.unwrap_or("*"))
            .arg("COUNT")
            .arg(count)
            .query_async::<(u64, Vec<String>)>(&mut con)
            .await?;
        let total = redis::cmd("SCARD").arg(key).query_async::<u64>(&mut con).await?;
        Ok(ScanPage {
            cursor: next,
            total,
            items: members.into_iter().map(SetElement::new).collect(),
        })
    }

    async fn create_string_key(&self, key: &str, value: &str) -> Result<String, StoreError> {
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .query_async::<Option<String>>(&mut self.con())
            .await?;
        match reply {
            Some(_) => Ok(value.to_string()),
            None => Err(StoreError::KeyExists(key.to_string())),
        }
    }

    async fn create_hash_key(
        &self,
        key: &str,
        fields: &[HashElement],
    ) -> Result<Vec<HashElement>, StoreError> {
        require_payload(fields, "hash")?;
        self.refuse_existing(key).await?;
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for element in fields {
            cmd.arg(&element.field).arg(&element.value);
        }
        cmd.query_async::<i64>(&mut self.con()).await?;

        // A repeated field keeps its last value, at its first position.
        let mut written: Vec<HashElement> = Vec::with_capacity(fields.len());
        for element in fields {
            match written.iter_mut().find(|e| e.field == element.field) {
                Some(existing) => existing.value = element.value.clone(),
                None => written.push(element.clone()),
            }
        }
        Ok(written)
    }

    async fn create_list_key(
        &self,
        key: &str,
        values: &[String],
    ) -> Result<Vec<ListElement>, StoreError> {
        require_payload(values, "list")?;
        self.refuse_existing(key).await?;
        redis::cmd("RPUSH")
            .arg(key)
            .arg(values)
            .query_async::<i64>(&mut self.con())
            .await?;
        Ok(values
            .iter()
            .enumerate()
            .map(|(index, value)| ListElement::new(index as i64, value.clone()))
            .collect())
    }

    async fn create_set_key(
        &self,
        key: &str,
        members: &[String],
    ) -> Result<Vec<SetElement>, StoreError> {
        require_payload(members, "set")?;
        self.refuse_existing(key).await?;
        redis::cmd("SADD")
            .arg(key)
            .arg(members)
            .query_async::<i64>(&mut self.con())
            .await?;
        let mut written: Vec<SetElement> = Vec::with_capacity(members.len());
        for member in members {
            if !written.iter().any(|e| &e.value == member) {
                written.push(SetElement::new(member.clone()));
            }
        }
        Ok(written)
    }

    async fn set_hash_field(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<ElementWrite<HashElement>, StoreError> {
        self.require(key).await?;
        let added = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async::<i64>(&mut self.con())
            .await?;
        Ok(ElementWrite {
            element: HashElement::new(field, value),
            added: added == 1,
        })
    }

    async fn delete_hash_field(&self, key: &str, field: &str) -> Result<bool, StoreError> {
        let removed = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async::<i64>(&mut self.con())
            .await?;
        if removed == 0 {
            self.require(key).await?;
        }
        Ok(removed > 0)
    }

    async fn set_list_element(
        &self,
        key: &str,
        index: i64,
        value: &str,
    ) -> Result<ListElement, StoreError> {
        let (_, len) = redis::pipe()
            .atomic()
            .cmd("LSET")
            .arg(key)
            .arg(index)
            .arg(value)
            .cmd("LLEN")
            .arg(key)
            .query_async::<(Value, i64)>(&mut self.con())
            .await
            .map_err(|e| list_error(key, index, e))?;
        let resolved = if index < 0 { len + index } else { index };
        Ok(ListElement::new(resolved, value))
    }

    async fn delete_list_element(&self, key: &str, index: i64) -> Result<bool, StoreError> {
        let tombstone = list_tombstone(index);
        let (_, removed) = redis::pipe()
            .atomic()
            .cmd("LSET")
            .arg(key)
            .arg(index)
            .arg(&tombstone)
            .cmd("LREM")
            .arg(key)
            .arg(1)
            .arg(&tombstone)
            .query_async::<(Value, i64)>(&mut self.con())
            .await
            .map_err(|e| list_error(key, index, e))?;
        Ok(removed > 0)
    }

    async fn push_list_element(
        &self,
        key: &str,
        position: ListPosition,
        value: &str,
    ) -> Result<ListElement, StoreError> {
        let command = match position {
            ListPosition::Head => "LPUSHX",
            ListPosition::Tail => "RPUSHX",
        };
        let len = redis::cmd(command)
            .arg(key)
            .arg(value)
            .query_async::<i64>(&mut self.con())
            .await?;
        if len == 0 {
            return Err(StoreError::KeyNotFound(key.to_string()));
        }
        let index = match position {
            ListPosition::Head => 0,
            ListPosition::Tail => len - 1,
        };
        Ok(ListElement::new(index, value))
    }

    async fn add_set_member(
        &self,
        key: &str,
        value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError> {
        self.require(key).await?;
        let added = redis::cmd("SADD")
            .arg(key)
            .arg(value)
            .query_async::<i64>(&mut self.con())
            .await?;
        Ok(ElementWrite {
            element: SetElement::new(value),
            added: added == 1,
        })
    }

    async fn replace_set_member(
        &self,
        key: &str,
        old_value: &str,
        new_value: &str,
    ) -> Result<ElementWrite<SetElement>, StoreError> {
        let mut con = self.con();
        let present = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(old_value)
            .query_async::<i64>(&mut con)
            .await?;
        if present == 0 {
            self.require(key).await?;
            return Err(StoreError::ElementNotFound {
                key: key.to_string(),
                element: old_value.to_string(),
            });
        }
        let (_, added) = redis::pipe()
            .atomic()
            .cmd("SREM")
            .arg(key)
            .arg(old_value)
            .cmd("SADD")
            .arg(key)
            .arg(new_value)
            .query_async::<(i64, i64)>(&mut con)
            .await?;
        Ok(ElementWrite {
            element: SetElement::new(new_value),
            added: added == 1,
        })
    }

    async fn delete_set_member(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let removed = redis::cmd("SREM")
            .arg(key)
            .arg(value)
            .query_async::<i64>(&mut self.con())
            .await?;
        if removed == 0 {
            self.require(key).await?;
        }
        Ok(removed > 0)
    }

    async fn execute(&self, args: &[String]) -> Result<String, StoreError> {
        let (name, rest) = args
            .split_first()
            .ok_or_else(|| StoreError::InvalidInput("No command entered.".to_string()))?;
        let mut cmd = redis::cmd(name);
        for arg in rest {
            cmd.arg(arg);
        }
        let reply = cmd.query_async::<Value>(&mut self.con()).await?;
        Ok(render_value(&reply))
    }
}
