use crate::application_impl::*;
use crate::application_port::TokenRefresher;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_memory::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;

/// Wires settings and adapters into a ready-to-use session.
pub struct App {
    pub session: Arc<AuthSession>,
    pub token_holder: Arc<dyn TokenHolder>,
}

impl App {
    pub fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(&settings.server.host)?);
        let notifier: Arc<dyn UserNotifier> = Arc::new(ConsoleNotifier::new());
        Ok(Self::with_parts(settings, transport, notifier))
    }

    pub fn with_parts(
        settings: &Settings,
        transport: Arc<dyn Transport>,
        notifier: Arc<dyn UserNotifier>,
    ) -> Self {
        let token_holder: Arc<dyn TokenHolder> = Arc::new(MemoryTokenHolder::new());
        let refresher: Arc<dyn TokenRefresher> = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            token_holder.clone(),
            settings.session.single_flight,
        ));
        let session = Arc::new(AuthSession::new(
            transport,
            token_holder.clone(),
            refresher,
            notifier,
            settings.session.rate_limit_message.clone(),
        ));
        session.setup_interceptors();

        info!(
            host = %settings.server.host,
            single_flight = settings.session.single_flight,
            "session ready"
        );

        Self {
            session,
            token_holder,
        }
    }
}
