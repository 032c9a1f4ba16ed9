//! Hashes a password read from stdin into an argon2id PHC string, for
//! seeding local accounts by hand.

use std::io::{self, BufRead, Write};

use portal_backend::users::hash_password;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    print!("Password: ");
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().lock().read_line(&mut password)?;
    let password = password.trim_end_matches(['\r', '\n']);

    let hash = hash_password(password)?;
    println!("{hash}");
    Ok(())
}
