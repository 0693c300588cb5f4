use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};

use crate::core::{Result, ShardingError, Value};

const AES_BLOCK: usize = 16;

/// Turns plaintext column values into stored ciphertext and back.
///
/// Encryption must be deterministic so that equality predicates can be
/// rewritten against the cipher column.
pub trait Encryptor: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn encrypt(&self, plain: &Value) -> Result<Value>;

    /// One-way encryptors return the stored value unchanged.
    fn decrypt(&self, cipher: &Value) -> Result<Value>;
}

/// `TYPE:text`, so `1` and `'1'` never share a ciphertext.
fn typed_text(value: &Value) -> String {
    format!("{}:{}", value.type_name(), value)
}

fn from_typed_text(text: &str) -> Result<Value> {
    let invalid = || ShardingError::Rewrite(format!("decrypted value '{}' is malformed", text));
    let (tag, body) = text.split_once(':').ok_or_else(invalid)?;
    match tag {
        "TEXT" => Ok(Value::Text(body.to_string())),
        "INTEGER" => body.parse().map(Value::Integer).map_err(|_| invalid()),
        "FLOAT" => body.parse().map(Value::Float).map_err(|_| invalid()),
        "BOOLEAN" => body.parse().map(Value::Boolean).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Hex SHA-256 digest of the salted, type-tagged value. `NULL` stays `NULL`.
/// Digests cannot be decrypted.
#[derive(Debug, Clone, Default)]
pub struct Sha256Encryptor {
    salt: Option<String>,
}

impl Sha256Encryptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_salt(salt: impl Into<String>) -> Self {
        Self {
            salt: Some(salt.into()),
        }
    }
}

impl Encryptor for Sha256Encryptor {
    fn name(&self) -> &str {
        "sha256"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        let mut hasher = Sha256::new();
        if let Some(salt) = &self.salt {
            hasher.update(salt.as_bytes());
        }
        hasher.update(typed_text(plain).as_bytes());
        Ok(Value::Text(format!("{:x}", hasher.finalize())))
    }

    fn decrypt(&self, cipher: &Value) -> Result<Value> {
        Ok(cipher.clone())
    }
}

/// AES-128 over single blocks (ECB) with PKCS#7 padding, base64 encoded.
///
/// The key is the first 16 bytes of the SHA-256 digest of the configured key
/// text. Decryption restores the original value type.
#[derive(Clone)]
pub struct AesEncryptor {
    cipher: Aes128,
}

impl AesEncryptor {
    pub fn new(key: &str) -> Self {
        let digest = Sha256::digest(key.as_bytes());
        Self {
            cipher: Aes128::new(GenericArray::from_slice(&digest[..AES_BLOCK])),
        }
    }
}

impl fmt::Debug for AesEncryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesEncryptor").finish_non_exhaustive()
    }
}

impl Encryptor for AesEncryptor {
    fn name(&self) -> &str {
        "aes"
    }

    fn encrypt(&self, plain: &Value) -> Result<Value> {
        if plain.is_null() {
            return Ok(Value::Null);
        }
        let mut data = typed_text(plain).into_bytes();
        let pad = AES_BLOCK - data.len() % AES_BLOCK;
        data.resize(data.len() + pad, pad as u8);
        for block in data.chunks_exact_mut(AES_BLOCK) {
            self.cipher.encrypt_block(GenericArray::from_mut_slice(block));
        }
        Ok(Value::Text(STANDARD.encode(&data)))
    }

    fn decrypt(&self, cipher: &Value) -> Result<Value> {
        let encoded = match cipher {
            Value::Null => return Ok(Value::Null),
            Value::Text(text) => text,
            other => {
                return Err(ShardingError::Rewrite(format!(
                    "aes ciphertext must be text, got {}",
                    other.type_name()
                )));
            }
        };
        let malformed = || ShardingError::Rewrite(format!("'{}' is not an aes ciphertext", encoded));

        let mut data = STANDARD.decode(encoded).map_err(|_| malformed())?;
        if data.is_empty() || data.len() % AES_BLOCK != 0 {
            return Err(malformed());
        }
        for block in data.chunks_exact_mut(AES_BLOCK) {
            self.cipher.decrypt_block(GenericArray::from_mut_slice(block));
        }

        let pad = data.last().copied().map(usize::from).unwrap_or_default();
        let padding_ok = (1..=AES_BLOCK).contains(&pad)
            && data[data.len() - pad..].iter().all(|&b| usize::from(b) == pad);
        if !padding_ok {
            return Err(malformed());
        }
        data.truncate(data.len() - pad);
        let text = String::from_utf8(data).map_err(|_| malformed())?;
        from_typed_text(&text)
    }
}

/// Resolves a built-in encryptor by its configuration name. `sha256` takes an
/// optional salt, `aes` requires a key.
pub fn encryptor(name: &str, salt: Option<&str>, key: Option<&str>) -> Result<Arc<dyn Encryptor>> {
    match name.to_ascii_lowercase().as_str() {
        "sha256" => Ok(Arc::new(Sha256Encryptor {
            salt: salt.map(str::to_string),
        })),
        "aes" => match key {
            Some(key) if !key.is_empty() => Ok(Arc::new(AesEncryptor::new(key))),
            _ => Err(ShardingError::Config(
                "aes encryptor needs a non-empty key".to_string(),
            )),
        },
        other => Err(ShardingError::Config(format!(
            "unknown encryptor '{}'",
            other
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct EncryptColumn {
    pub logic_column: String,
    pub cipher_column: String,
    pub plain_column: Option<String>,
    pub encryptor: Arc<dyn Encryptor>,
}

impl EncryptColumn {
    pub fn new(
        logic_column: impl Into<String>,
        cipher_column: impl Into<String>,
        encryptor: Arc<dyn Encryptor>,
    ) -> Self {
        Self {
            logic_column: logic_column.into(),
            cipher_column: cipher_column.into(),
            plain_column: None,
            encryptor,
        }
    }

    pub fn plain_column(mut self, plain_column: impl Into<String>) -> Self {
        self.plain_column = Some(plain_column.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct EncryptTable {
    pub table: String,
    pub columns: Vec<EncryptColumn>,
}

impl EncryptTable {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
        }
    }

    pub fn column(mut self, column: EncryptColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn find_column(&self, logic_column: &str) -> Option<&EncryptColumn> {
        self.columns
            .iter()
            .find(|c| c.logic_column.eq_ignore_ascii_case(logic_column))
    }
}

/// Column encryption over a single data source.
#[derive(Debug, Clone)]
pub struct EncryptRule {
    data_source: String,
    tables: Vec<EncryptTable>,
}

impl EncryptRule {
    pub fn new(data_source: impl Into<String>) -> Self {
        Self {
            data_source: data_source.into(),
            tables: Vec::new(),
        }
    }

    pub fn table(mut self, table: EncryptTable) -> Self {
        self.tables.push(table);
        self
    }

    pub fn data_source(&self) -> &str {
        &self.data_source
    }

    pub fn tables(&self) -> &[EncryptTable] {
        &self.tables
    }

    pub fn find_table(&self, table: &str) -> Option<&EncryptTable> {
        self.tables
            .iter()
            .find(|t| t.table.eq_ignore_ascii_case(table))
    }

    pub fn find_column(&self, table: &str, logic_column: &str) -> Option<&EncryptColumn> {
        self.find_table(table)?.find_column(logic_column)
    }

    /// Plaintext for a value read back from `table.logic_column`. Values of
    /// unencrypted columns pass through.
    pub fn decrypt_value(&self, table: &str, logic_column: &str, value: &Value) -> Result<Value> {
        match self.find_column(table, logic_column) {
            Some(column) => column.encryptor.decrypt(value),
            None => Ok(value.clone()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_source.trim().is_empty() {
            return Err(ShardingError::Config(
                "encrypt rule needs a data source".to_string(),
            ));
        }

        let mut tables = HashSet::new();
        for table in &self.tables {
            if !tables.insert(table.table.to_ascii_lowercase()) {
                return Err(ShardingError::Config(format!(
                    "encrypt table '{}' appears more than once",
                    table.table
                )));
            }
            let mut columns = HashSet::new();
            for column in &table.columns {
                if !columns.insert(column.logic_column.to_ascii_lowercase()) {
                    return Err(ShardingError::Config(format!(
                        "encrypt column '{}.{}' appears more than once",
                        table.table, column.logic_column
                    )));
                }
                if column.cipher_column.trim().is_empty() {
                    return Err(ShardingError::Config(format!(
                        "encrypt column '{}.{}' needs a cipher column",
                        table.table, column.logic_column
                    )));
                }
                if column
                    .plain_column
                    .as_deref()
                    .is_some_and(|plain| plain.eq_ignore_ascii_case(&column.cipher_column))
                {
                    return Err(ShardingError::Config(format!(
                        "plain and cipher columns of '{}.{}' must differ",
                        table.table, column.logic_column
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_rule() -> EncryptRule {
        EncryptRule::new("ds").table(
            EncryptTable::new("t_user").column(
                EncryptColumn::new("pwd", "pwd_cipher", Arc::new(Sha256Encryptor::new()))
                    .plain_column("pwd_plain"),
            ),
        )
    }

    #[test]
    fn test_sha256_digest() {
        let cipher = Sha256Encryptor::new().encrypt(&Value::from("abc")).unwrap();
        assert_eq!(
            cipher,
            Value::from("faa27e5afbea948d343535f6316a5eca1478e3055f6ca63931ad5c638129b4b3")
        );
        assert_eq!(Sha256Encryptor::new().encrypt(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_digest_depends_on_value_type() {
        let sha = Sha256Encryptor::new();
        assert_ne!(
            sha.encrypt(&Value::Integer(1)).unwrap(),
            sha.encrypt(&Value::from("1")).unwrap()
        );
        assert_ne!(
            sha.encrypt(&Value::Boolean(true)).unwrap(),
            sha.encrypt(&Value::from("true")).unwrap()
        );
    }

    #[test]
    fn test_aes_round_trip_keeps_type() {
        let aes = AesEncryptor::new("k3y");
        for plain in [
            Value::from("secret"),
            Value::from(""),
            Value::from("exactly 16 bytes"),
            Value::Integer(-42),
            Value::Float(2.5),
            Value::Boolean(false),
        ] {
            let cipher = aes.encrypt(&plain).unwrap();
            assert_ne!(cipher, plain);
            assert_eq!(aes.decrypt(&cipher).unwrap(), plain);
        }
        assert_eq!(aes.encrypt(&Value::Null).unwrap(), Value::Null);
        assert_eq!(aes.decrypt(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_aes_is_deterministic_per_key() {
        let plain = Value::from("secret");
        let a = AesEncryptor::new("one");
        assert_eq!(a.encrypt(&plain).unwrap(), a.encrypt(&plain).unwrap());
        assert_ne!(
            a.encrypt(&plain).unwrap(),
            AesEncryptor::new("two").encrypt(&plain).unwrap()
        );
        assert_ne!(
            a.encrypt(&Value::Integer(1)).unwrap(),
            a.encrypt(&Value::from("1")).unwrap()
        );
    }

    #[test]
    fn test_aes_rejects_bad_ciphertext() {
        let aes = AesEncryptor::new("k3y");
        assert!(aes.decrypt(&Value::from("not base64!")).is_err());
        assert!(aes.decrypt(&Value::from("YWJj")).is_err());
        assert!(aes.decrypt(&Value::Integer(7)).is_err());
        let foreign = AesEncryptor::new("other").encrypt(&Value::from("x")).unwrap();
        assert!(aes.decrypt(&foreign).is_err());
    }

    #[test]
    fn test_encryptor_registry() {
        assert_eq!(encryptor("SHA256", Some("s"), None).unwrap().name(), "sha256");
        assert_eq!(encryptor("aes", None, Some("k")).unwrap().name(), "aes");
        assert!(encryptor("aes", None, None).is_err());
        assert!(encryptor("rot13", None, None).is_err());
    }

    #[test]
    fn test_salt_changes_digest() {
        let plain = Value::from("abc");
        assert_ne!(
            Sha256Encryptor::new().encrypt(&plain).unwrap(),
            Sha256Encryptor::with_salt("pepper").encrypt(&plain).unwrap()
        );
    }

    #[test]
    fn test_find_column_is_case_insensitive() {
        let rule = user_rule();
        assert_eq!(rule.find_column("T_USER", "PWD").unwrap().cipher_column, "pwd_cipher");
        assert!(rule.find_column("t_user", "name").is_none());
    }

    #[test]
    fn test_decrypt_passes_unencrypted_columns_through() {
        let rule = user_rule();
        let value = Value::from("alice");
        assert_eq!(rule.decrypt_value("t_user", "name", &value).unwrap(), value);
    }

    #[test]
    fn test_validate_rejects_duplicate_columns() {
        let encryptor: Arc<dyn Encryptor> = Arc::new(Sha256Encryptor::new());
        let rule = EncryptRule::new("ds").table(
            EncryptTable::new("t_user")
                .column(EncryptColumn::new("pwd", "c1", encryptor.clone()))
                .column(EncryptColumn::new("PWD", "c2", encryptor)),
        );
        assert!(rule.validate().is_err());
        assert!(user_rule().validate().is_ok());
    }
}
