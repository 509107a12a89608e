//! End-to-end controller scenarios over a recording gateway.

use std::sync::Arc;

use pumplink::{
    AuthorizeType, ChannelBaudRate, ChannelConfig, ChannelProtocol, CommandRequest, Controller,
    ControllerConfig, GatewayRequest, PumpCommand, PumpConfig, PumpEvent, PumpResponse,
    PumpStatus, RecordingGateway, TickOutcome, ValidatedField,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn two_pump_config() -> ControllerConfig {
    ControllerConfig {
        channels: vec![ChannelConfig {
            id: 1,
            baud_rate: ChannelBaudRate::Baud9600,
            protocol: ChannelProtocol::Unipump,
        }],
        pumps: vec![
            PumpConfig {
                id: 1,
                physical_address: 1,
                channel_id: 1,
                autoclose_transaction: true,
                active: true,
            },
            PumpConfig {
                id: 2,
                physical_address: 2,
                channel_id: 1,
                autoclose_transaction: true,
                active: true,
            },
        ],
        ..ControllerConfig::default()
    }
}

#[tokio::test]
async fn authorize_dispatches_after_five_polls_on_a_quiet_bus() {
    init_tracing();
    let gateway = Arc::new(RecordingGateway::new(2, false));
    let mut controller = Controller::new(two_pump_config(), gateway.clone())
        .await
        .unwrap();

    // lock confirmation is what lets the countdown run at all
    controller
        .handle_response(1, PumpResponse::LockState { locked: true })
        .await
        .unwrap();
    let pump = controller.pump(1).unwrap();
    pump.set_price_per_liter(1, 150).await.unwrap();
    pump.queue(
        CommandRequest::new(PumpCommand::Authorize)
            .with_nozzle(1)
            .with_dose(AuthorizeType::FullTank, 0),
    )
    .await
    .unwrap();

    // five full cycles keep both pumps on plain polls
    for _ in 0..5 {
        let outcomes = controller.poll_cycle().await;
        assert!(outcomes.iter().all(|(_, o)| *o == TickOutcome::Polled));
    }
    // the sixth cycle writes the authorize for pump 1 only
    let outcomes = controller.poll_cycle().await;
    assert_eq!(
        outcomes[0],
        (
            1,
            TickOutcome::Dispatched {
                opcode: PumpCommand::Authorize.opcode()
            }
        )
    );
    assert_eq!(outcomes[1], (2, TickOutcome::Polled));

    let log = gateway.requests();
    assert_eq!(log.len(), 12);
    let authorizes: Vec<_> = log.iter().filter(|r| !r.is_status()).collect();
    assert_eq!(
        authorizes,
        vec![&GatewayRequest::Authorize {
            pump_id: 1,
            nozzle_id: 1,
            authorize_type: AuthorizeType::FullTank,
            dose: 0,
            price: 150,
            extended: false,
        }]
    );

    controller.shutdown().await;
}

#[tokio::test]
async fn finished_transaction_is_closed_automatically() {
    init_tracing();
    let gateway = Arc::new(RecordingGateway::new(2, false));
    let mut controller = Controller::new(two_pump_config(), gateway.clone())
        .await
        .unwrap();
    let mut events = controller.subscribe();

    controller
        .handle_response(1, PumpResponse::LockState { locked: true })
        .await
        .unwrap();
    controller
        .handle_response(
            1,
            PumpResponse::Status {
                status: 2,
                nozzle_id: 1,
            },
        )
        .await
        .unwrap();
    controller
        .handle_response(
            1,
            PumpResponse::DispenseProgress {
                amount: 12.40,
                volume: 800,
            },
        )
        .await
        .unwrap();
    controller
        .handle_response(
            1,
            PumpResponse::TransactionEnd {
                transaction_id: 501,
                amount: 43.75,
                volume: 2_900,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::StatusChanged {
            pump_id: 1,
            status: PumpStatus::Filling
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::NozzleChanged {
            pump_id: 1,
            nozzle_id: 1
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::TransactionFinished {
            pump_id: 1,
            transaction_id: 501,
            amount: 43.75,
            volume: 2_900,
        }
    );

    // the queued close waits its rounds, then carries the transaction id
    for _ in 0..6 {
        controller.poll_cycle().await;
    }
    assert!(gateway.requests().contains(&GatewayRequest::CloseTransaction {
        pump_id: 1,
        transaction_id: 501,
    }));

    controller.shutdown().await;
}

#[tokio::test]
async fn rejected_writes_keep_state_and_reach_the_drain() {
    init_tracing();
    let gateway = Arc::new(RecordingGateway::new(2, false));
    let mut controller = Controller::new(two_pump_config(), gateway)
        .await
        .unwrap();

    let pump = controller.pump(2).unwrap();
    pump.set_physical_address(250).await.unwrap();
    pump.set_price_per_liter(1, -10).await.unwrap();

    let snapshot = pump.snapshot().await.unwrap();
    assert_eq!(snapshot.physical_address, 2);
    assert_eq!(snapshot.prices[0], 0);

    let errors = controller.drain_validation_errors();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].field, ValidatedField::PhysicalAddress);
    assert_eq!(errors[0].rejected, 250);
    assert_eq!(errors[1].field, ValidatedField::PricePerLiter);
    assert_eq!(errors[1].rejected, -10);

    controller.shutdown().await;
}

#[tokio::test]
async fn totals_prices_and_tags_land_in_the_snapshot() {
    init_tracing();
    let gateway = Arc::new(RecordingGateway::new(2, false));
    let mut controller = Controller::new(two_pump_config(), gateway)
        .await
        .unwrap();
    let mut events = controller.subscribe();

    controller
        .handle_response(1, PumpResponse::Prices(vec![150, 165, 0, 0, 0, 0]))
        .await
        .unwrap();
    controller
        .handle_response(
            1,
            PumpResponse::Totals {
                nozzle_id: 2,
                amount: 9_000_000,
                volume: 550_000,
            },
        )
        .await
        .unwrap();
    controller
        .handle_response(
            1,
            PumpResponse::Tag {
                nozzle_id: 1,
                code: "0FA3".into(),
            },
        )
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::PricesReceived { pump_id: 1 }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::TotalsUpdated {
            pump_id: 1,
            nozzle_id: 2
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        PumpEvent::TagReceived {
            pump_id: 1,
            nozzle_id: 1,
            code: "0FA3".into()
        }
    );

    let snapshot = controller.pump(1).unwrap().snapshot().await.unwrap();
    assert_eq!(snapshot.prices, vec![150, 165, 0, 0, 0, 0]);

    controller.shutdown().await;
}

#[tokio::test]
async fn deactivated_pump_drops_out_of_the_cycle() {
    init_tracing();
    let gateway = Arc::new(RecordingGateway::new(2, false));
    let mut controller = Controller::new(two_pump_config(), gateway.clone())
        .await
        .unwrap();

    controller.pump(2).unwrap().set_active(false).await.unwrap();

    let outcomes = controller.poll_cycle().await;
    assert_eq!(
        outcomes,
        vec![(1, TickOutcome::Polled), (2, TickOutcome::Inactive)]
    );
    assert_eq!(gateway.requests().len(), 1);

    controller.pump(2).unwrap().set_active(true).await.unwrap();
    let outcomes = controller.poll_cycle().await;
    assert_eq!(
        outcomes,
        vec![(1, TickOutcome::Polled), (2, TickOutcome::Polled)]
    );

    controller.shutdown().await;
}
