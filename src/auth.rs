use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Every login shares one password. The login user name becomes the owner
/// of the bookings made on that connection.
#[derive(Debug)]
pub struct SharedPasswordAuthSource {
    password: String,
}

impl SharedPasswordAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for SharedPasswordAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        tracing::debug!("login attempt by {:?}", login.user());
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}
