criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .sample_size(50)
        .measurement_time(std::time::Duration::from_secs(2));
    targets =
        generating_card,
        shuffling_call_pool,
        validating_winning_claim,
        validating_bogus_claim,
        drawing_full_session,
}

use bingo_engine::game::caller::NumberCaller;
use bingo_engine::game::card::generate_card;
use bingo_engine::game::state::{GameState, PlayerId, SessionId, SessionState};
use bingo_engine::game::validator::validate;
use bingo_engine::DeterministicRng;

fn generating_card(c: &mut criterion::Criterion) {
    let mut rng = DeterministicRng::new(7);
    c.bench_function("generate a 5x5 card", |b| b.iter(|| generate_card(&mut rng)));
}

fn shuffling_call_pool(c: &mut criterion::Criterion) {
    let mut rng = DeterministicRng::new(7);
    c.bench_function("shuffle a 75-number call pool", |b| {
        b.iter(|| NumberCaller::new(&mut rng))
    });
}

fn validating_winning_claim(c: &mut criterion::Criterion) {
    let mut rng = DeterministicRng::new(7);
    let card = generate_card(&mut rng);
    let history: Vec<u8> = NumberCaller::new(&mut rng).map(|call| call.number).collect();
    let marked: Vec<u8> = card.numbers().collect();
    c.bench_function("validate a full-card claim", |b| {
        b.iter(|| validate(&card, &marked, &history))
    });
}

fn validating_bogus_claim(c: &mut criterion::Criterion) {
    let mut rng = DeterministicRng::new(7);
    let card = generate_card(&mut rng);
    let history: Vec<u8> = NumberCaller::new(&mut rng).take(20).map(|call| call.number).collect();
    let marked: Vec<u8> = card.numbers().collect();
    c.bench_function("reject a claim with uncalled numbers", |b| {
        b.iter(|| validate(&card, &marked, &history))
    });
}

fn drawing_full_session(c: &mut criterion::Criterion) {
    c.bench_function("seat 50 players and draw all 75 numbers", |b| {
        b.iter(|| {
            let mut game = GameState::new(SessionId::new([1; 16]), 42);
            for i in 0..50u8 {
                let _ = game.add_player(PlayerId::new([i; 16]), String::new(), 50);
            }
            let _ = game.transition(SessionState::Countdown);
            let _ = game.transition(SessionState::Active);
            while let Ok(bingo_engine::game::caller::Draw::Called(_)) = game.call_next() {}
            game
        })
    });
}
