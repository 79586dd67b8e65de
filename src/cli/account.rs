//! Sign-in, registration and session inspection commands

use std::error::Error;
use std::io::{self, Write};

use crate::core::client::ApiClient;

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String, Box<dyn Error>> {
    let value = match value {
        Some(value) => value,
        None => prompt(label)?,
    };
    if value.is_empty() {
        return Err(format!("{label} cannot be empty").into());
    }
    Ok(value)
}

pub async fn login(client: &ApiClient, username: Option<String>) -> Result<(), Box<dyn Error>> {
    let username = value_or_prompt(username, "Username")?;
    let password = value_or_prompt(None, "Password")?;

    let session = client.login(&username, &password).await?;
    let name = session
        .user
        .map(|user| user.username)
        .unwrap_or(username);
    println!("✅ Signed in as {name} at {}", client.base_url());
    Ok(())
}

pub async fn register(
    client: &ApiClient,
    username: Option<String>,
    email: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let username = value_or_prompt(username, "Username")?;
    let email = value_or_prompt(email, "Email")?;
    let password = value_or_prompt(None, "Password")?;

    client.register(&username, &email, &password).await?;
    println!("✅ Registered and signed in as {username}");
    Ok(())
}

pub async fn logout(client: &ApiClient) -> Result<(), Box<dyn Error>> {
    if !client.is_logged_in() {
        println!("Not signed in.");
        return Ok(());
    }
    client.logout().await;
    println!("✅ Signed out");
    Ok(())
}

pub async fn whoami(client: &ApiClient) -> Result<(), Box<dyn Error>> {
    if !client.restore_session().await {
        return Err("Not signed in. Run 'chatwire login' first.".into());
    }
    let Some(user) = client.current_session().and_then(|session| session.user) else {
        return Err("Stored session has no user".into());
    };
    println!("👤 {} <{}>", user.username, user.email);
    println!("   id: {}", user.id);
    println!("   backend: {}", client.base_url());
    Ok(())
}
