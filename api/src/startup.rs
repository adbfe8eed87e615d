use std::net::TcpListener;

use actix_web::dev::{Server, ServerHandle};
use actix_web::{App, HttpServer, web};
use config::shared::GatewayConfig;
use warehouse::clients::WarehouseConnector;
use warehouse::secrets::CredentialProvider;

use crate::request_logging::RequestLogging;
use crate::routes::health_check::health_check;
use crate::routes::tools::{execute_query, get_table_schema};
use crate::state::AppState;

/// Gateway HTTP server wrapper.
pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    /// Binds the configured address and builds the server around `state`.
    ///
    /// The server answers health checks right away; tool calls report an error until a context
    /// is installed into `state`.
    pub fn build<P, C>(
        config: &GatewayConfig,
        state: web::Data<AppState<P, C>>,
    ) -> anyhow::Result<Self>
    where
        P: CredentialProvider + 'static,
        C: WarehouseConnector,
    {
        let address = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let server = run(listener, state)?;

        Ok(Self { port, server })
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns a handle that can stop the server.
    pub fn handle(&self) -> ServerHandle {
        self.server.handle()
    }

    /// Runs the server until it receives a shutdown signal or is stopped through its handle.
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

/// Creates the HTTP server with the tool routes and the health probe.
pub fn run<P, C>(
    listener: TcpListener,
    state: web::Data<AppState<P, C>>,
) -> Result<Server, std::io::Error>
where
    P: CredentialProvider + 'static,
    C: WarehouseConnector,
{
    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogging)
            .app_data(state.clone())
            .route("/health", web::get().to(health_check::<P, C>))
            .service(
                web::scope("/tools")
                    .route("/get_table_schema", web::post().to(get_table_schema::<P, C>))
                    .route("/execute_query", web::post().to(execute_query::<P, C>)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
