use crate::domain_model::LoginRedirect;

pub trait Navigator: Send + Sync {
    fn navigate_to_login(&self, redirect: LoginRedirect);
}
