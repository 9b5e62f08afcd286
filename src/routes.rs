use crate::{
    api::{attendance, presence},
    auth::middleware::auth_middleware,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{middleware::from_fn, web};

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    // Helper to build per-route limiter
    fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
        let per_ms = if requests_per_min == 0 {
            1
        } else {
            60_000 / requests_per_min as u64
        };
        let cfg = GovernorConfigBuilder::default()
            .per_millisecond(per_ms)
            .burst_size(requests_per_min)
            .key_extractor(PeerIpKeyExtractor)
            .finish()
            .unwrap();
        Governor::new(&cfg)
    }

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(auth_middleware))
            .service(
                web::scope("/attendance")
                    // /attendance/heartbeat gets its own limiter: devices
                    // report every few tens of seconds
                    .service(
                        web::resource("/heartbeat")
                            .wrap(build_limiter(config.rate_heartbeat_per_min))
                            .route(web::post().to(attendance::heartbeat)),
                    )
                    // /attendance
                    .service(
                        web::resource("")
                            .wrap(build_limiter(config.rate_protected_per_min))
                            .route(web::post().to(attendance::check_in))
                            .route(web::put().to(attendance::check_out)),
                    ),
            )
            .service(
                web::scope("/presence")
                    .wrap(build_limiter(config.rate_protected_per_min))
                    // /presence/now
                    .service(web::resource("/now").route(web::get().to(presence::present_now)))
                    // /presence/absent
                    .service(web::resource("/absent").route(web::get().to(presence::absent)))
                    // /presence/sweep
                    .service(web::resource("/sweep").route(web::post().to(presence::sweep))),
            ),
    );
}
