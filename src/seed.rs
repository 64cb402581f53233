use anyhow::Result;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};

async fn open(redis_url: &str, db_index: u8) -> Result<MultiplexedConnection> {
    let client = Client::open(redis_url)?;
    let mut con = client.get_multiplexed_async_connection().await?;
    redis::cmd("SELECT").arg(db_index).query_async::<()>(&mut con).await?;
    println!("Selected database {}.", db_index);
    Ok(con)
}

pub async fn purge_redis_data(redis_url: &str, db_index: u8) -> Result<()> {
    println!("Connecting to {} (DB {}) to purge keys...", redis_url, db_index);
    let mut con = open(redis_url, db_index).await?;

    println!("Purging database {}...", db_index);
    redis::cmd("FLUSHDB").query_async::<()>(&mut con).await?;
    println!("Database {} purged.", db_index);
    Ok(())
}

/// Flushes the database and fills it with keys of every editable type,
/// sized so that listings and element views need several pages.
pub async fn seed_redis_data(redis_url: &str, db_index: u8) -> Result<()> {
    println!("Connecting to {} (DB {}) to seed data...", redis_url, db_index);
    let mut con = open(redis_url, db_index).await?;

    redis::cmd("FLUSHDB").query_async::<()>(&mut con).await?;
    println!("Database {} flushed.", db_index);

    for i in 0..1000 {
        let _: () = con
            .set(format!("seed:simple:{}", i), format!("Simple value {}", i))
            .await?;
    }
    println!("Seeded 1000 simple keys.");

    for i in 0..20 {
        for j in 0..10 {
            let key = format!("seed:level1:{}:level2:{}", i, j);
            let _: () = con.set(&key, format!("Value for {}", key)).await?;
        }
    }
    println!("Seeded nested keys (20 * 10).");

    for i in 0..20 {
        let fields = hash_fields(i, 200);
        let _: () = con.hset_multiple(format!("seed:large_hash:{}", i), &fields).await?;
    }
    println!("Seeded 20 large hashes (20 * 200 fields).");

    for i in 0..20 {
        let items: Vec<String> = (0..500).map(|j| format!("list_{}_item_{}", i, j)).collect();
        let _: () = con.rpush(format!("seed:large_list:{}", i), items).await?;
    }
    println!("Seeded 20 large lists (20 * 500 items).");

    for i in 0..20 {
        let members: Vec<String> = (0..300).map(|j| format!("set_{}_member_{}", i, j)).collect();
        let _: () = con.sadd(format!("seed:large_set:{}", i), members).await?;
    }
    println!("Seeded 20 large sets (20 * 300 members).");

    let _: () = con.set("seed:string", "Hello from the explorer seeder!").await?;
    let _: () = con
        .set(
            "seed:json",
            r#"{"user":{"id":42,"name":"Ada","roles":["admin","dev"]},"active":true}"#,
        )
        .await?;
    let _: () = con.set("seed:multiline", "line one\nline two\ttabbed").await?;
    let _: () = con
        .hset_multiple(
            "seed:hash",
            &[("field1", "Value1"), ("field2", "Another Value"), ("age", "30")],
        )
        .await?;
    let _: () = con
        .rpush("seed:list", &["Item 1", "Item 2", "Item 3", "Yet another item"])
        .await?;
    let _: () = con
        .sadd("seed:set", &["MemberA", "MemberB", "MemberC", "MemberD"])
        .await?;
    // Not editable here; scans are expected to skip it.
    let _: () = con
        .zadd_multiple("seed:zset", &[(1.0, "One"), (10.0, "Ten")])
        .await?;

    println!("Finished seeding data.");
    Ok(())
}

fn hash_fields(hash_index: usize, count: usize) -> Vec<(String, String)> {
    (0..count)
        .map(|j| {
            (
                format!("field_{}", j),
                format!("value_for_hash_{}_field_{}", hash_index, j),
            )
        })
        .collect()
}
