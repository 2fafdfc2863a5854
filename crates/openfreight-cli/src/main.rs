//! OpenFreight CLI - scripted demos of the marketplace core
//!
//! Wires the four components into an in-memory deployment and drives a
//! full delivery lifecycle through it with simulated timestamps:
//!
//! ```bash
//! openfreight demo delivery
//! openfreight demo dispute --quorum 3
//! ```

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use openfreight_dispute::{DisputeConfig, DisputeCourt};
use openfreight_engine::{ServiceRequestEngine, SettlementPolicy};
use openfreight_license::{LicenseRegistry, MINT_PRICE};
use openfreight_registry::Registry;
use openfreight_token::RewardToken;
use openfreight_types::{
    Amount, GeoHash, Role, SrDraft, SrId, Status, Uid, VoteChoice,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// OpenFreight CLI - peer-to-peer delivery marketplace demos
#[derive(Parser)]
#[command(name = "openfreight")]
#[command(author = "OpenFreight Contributors")]
#[command(version)]
#[command(about = "Dutch-auction delivery marketplace with regional dispute votes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scripted marketplace scenarios
    Demo {
        #[command(subcommand)]
        scenario: DemoCommands,
    },
}

#[derive(Subcommand)]
enum DemoCommands {
    /// Auction, delivery, and unconditional acceptance
    Delivery,
    /// Auction, delivery, rejection, and a regional dispute vote
    Dispute {
        /// Votes required before the dispute can resolve
        #[arg(long, default_value_t = 2)]
        quorum: u32,
    },
}

/// An in-memory deployment of the four components, wired the way the
/// migration scripts wire the real thing
struct Deployment {
    registry: Registry,
    licenses: LicenseRegistry,
    token: RewardToken,
    court: DisputeCourt,
    engine: ServiceRequestEngine,
    admin: Uid,
    clock: DateTime<Utc>,
}

impl Deployment {
    fn new(quorum: u32) -> Result<Self> {
        let admin = Uid::new();
        let registry = Registry::new(admin);
        let licenses = LicenseRegistry::new(admin);
        let token = RewardToken::new(admin);
        let court = DisputeCourt::new(admin, registry.clone(), DisputeConfig { quorum });
        registry.set_dispute_peer(admin, court.component_uid())?;
        let engine = ServiceRequestEngine::new(
            registry.clone(),
            licenses.clone(),
            court.clone(),
            token.clone(),
            SettlementPolicy::default(),
        );
        court.set_engine_peer(admin, engine.component_uid())?;
        token.set_engine_peer(admin, engine.component_uid())?;
        Ok(Self {
            registry,
            licenses,
            token,
            court,
            engine,
            admin,
            clock: Utc::now(),
        })
    }

    fn advance(&mut self, minutes: i64) {
        self.clock += Duration::minutes(minutes);
    }

    fn onboard(&self, name: &str, region: &str, role: Role) -> Result<Uid> {
        let uid = Uid::new();
        let geohash = GeoHash::new(region)?;
        self.registry
            .create_user(uid, name, geohash, "+919876543210", self.clock)?;
        if role == Role::Driver {
            self.licenses.public_mint(
                uid,
                MINT_PRICE,
                name,
                "DL123456",
                "QmLicenseImage",
                self.clock,
            )?;
        }
        let request = self.registry.create_role_request(uid, role, self.clock)?;
        self.registry.approve_or_reject(self.admin, request, true)?;
        info!(%uid, name, region, %role, "onboarded");
        Ok(uid)
    }

    fn post_job(&self, shipper: Uid, receiver: Uid) -> Result<SrId> {
        let draft = SrDraft {
            description: "Deliver a laptop".into(),
            receiver,
            origin: GeoHash::new("tdr1yt")?,
            dest: GeoHash::new("tdr4km")?,
            origin_approx: GeoHash::new("tdr1")?,
            dest_approx: GeoHash::new("tdr4")?,
            cargo_value: Amount::from_whole(100),
            service_fee: Amount::from_whole(10),
            requested_pickup: self.clock + Duration::days(2),
            requested_delivery: self.clock + Duration::days(3),
            auction_end_minutes: 240,
            initial_status: Status::ReadyForAuction,
        };
        let escrow = Amount::from_whole(110);
        let id = self
            .engine
            .create_sr(shipper, escrow, draft, "+919848012345", self.clock)?;
        Ok(id)
    }

    /// Auction with two competing drivers, then carry the parcel to
    /// Delivered. Returns the winning driver.
    fn deliver(&mut self, id: SrId, shipper: Uid) -> Result<Uid> {
        let first = self.onboard("Early Driver", "tdr", Role::Driver)?;
        let second = self.onboard("Cheaper Driver", "tdr", Role::Driver)?;
        let stake = Amount::from_whole(100);

        self.advance(30);
        self.engine
            .dutch_bid(first, stake, id, Amount::from_whole(9), self.clock)?;
        self.advance(30);
        self.engine
            .dutch_bid(second, stake, id, Amount::from_whole(8), self.clock)?;

        self.advance(200); // past the 240-minute window
        let winner = self.engine.declare_winner(shipper, id, self.clock)?;

        self.engine.update_status(shipper, id, Status::ReadyForPickup)?;
        self.engine.update_status(winner, id, Status::ParcelPickedUp)?;
        self.advance(120);
        self.engine.update_status(winner, id, Status::InTransit)?;
        self.advance(120);
        self.engine.update_status(winner, id, Status::Delivered)?;
        Ok(winner)
    }

    fn report(&self, id: SrId, driver: Uid) -> Result<()> {
        let sr = self.engine.sr(id)?;
        let account = self.engine.escrow_account(id)?;
        info!(
            request = %id,
            status = ?sr.status,
            dispute_winner = ?sr.dispute_winner,
            escrow_in = %account.total_deposited(),
            escrow_out = %account.total_paid_out(),
            settled = account.is_settled(),
            "final state"
        );
        info!(
            driver_rating = self.registry.user_info(driver)?.rating_stars,
            driver_reward = %self.token.balance_of(driver),
            "driver outcome"
        );
        Ok(())
    }
}

fn run_delivery() -> Result<()> {
    let mut world = Deployment::new(2)?;
    let shipper = world.onboard("Acme Shipping", "tdr1", Role::Shipper)?;
    let receiver = world.onboard("Jane Receiver", "tdr4", Role::Receiver)?;
    let id = world.post_job(shipper, receiver)?;
    let driver = world.deliver(id, shipper)?;

    world
        .engine
        .update_status(receiver, id, Status::UnconditionallyAccepted)?;
    world.report(id, driver)
}

fn run_dispute(quorum: u32) -> Result<()> {
    let mut world = Deployment::new(quorum)?;
    let shipper = world.onboard("Acme Shipping", "tdr1", Role::Shipper)?;
    let receiver = world.onboard("Jane Receiver", "tdr4", Role::Receiver)?;
    let id = world.post_job(shipper, receiver)?;
    let driver = world.deliver(id, shipper)?;

    world.engine.update_status(receiver, id, Status::Disputed)?;
    info!(request = %id, "receiver rejected the delivery, regional vote opens");

    // The regional jury leans toward the receiver by one vote
    for (index, choice) in std::iter::repeat(VoteChoice::Receiver)
        .take(quorum as usize)
        .chain(std::iter::once(VoteChoice::Driver))
        .enumerate()
    {
        let juror = world.onboard(&format!("Juror {index}"), "tdr", Role::Driver)?;
        world.court.vote(juror, id, choice)?;
    }

    let outcome = world.engine.resolve_dispute(world.admin, id)?;
    info!(?outcome, "dispute resolved by the regional jury");
    world.report(id, driver)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Demo { scenario } => match scenario {
            DemoCommands::Delivery => run_delivery(),
            DemoCommands::Dispute { quorum } => run_dispute(quorum),
        },
    }
}
