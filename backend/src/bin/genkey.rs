//! Generates an EC P-256 keypair for the `security.signing_key` config
//! entry. Prints the private key followed by the public key, both PEM.

use rcgen::KeyPair;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let key_pair = KeyPair::generate()?;
    println!("{}", key_pair.serialize_pem());
    println!("{}", key_pair.public_key_pem());
    Ok(())
}
