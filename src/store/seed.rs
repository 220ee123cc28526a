// =============================================================================
// SAMPLE DATA
// =============================================================================
// Reference data for local runs.
//
// One theatre, one 5x8 hall, one movie and three showtimes starting from the
// given instant. Both store backends load the same fixture.
// =============================================================================

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Hall, Movie, Seat, ShowTime, Theatre};

#[derive(Debug, Clone)]
pub struct SampleCinema {
    pub theatre: Theatre,
    pub movie: Movie,
    pub hall: Hall,
    pub seats: Vec<Seat>,
    pub show_times: Vec<ShowTime>,
}

/// Generate the full seat grid for a hall.
pub fn seat_grid(hall: &Hall) -> Vec<Seat> {
    let mut seats = Vec::with_capacity((hall.row_count * hall.column_count).max(0) as usize);
    for row in 1..=hall.row_count {
        for column in 1..=hall.column_count {
            seats.push(Seat {
                id: Uuid::new_v4(),
                hall_id: hall.id,
                row_number: row,
                column_number: column,
                label: Seat::label_for(row, column),
            });
        }
    }
    seats
}

pub fn sample_cinema(from: DateTime<Utc>) -> SampleCinema {
    let theatre = Theatre {
        id: Uuid::new_v4(),
        name: "Grand Central Cinema".to_string(),
    };
    let movie = Movie {
        id: Uuid::new_v4(),
        title: "The Last Seat".to_string(),
        duration_minutes: 118,
    };
    let hall = Hall {
        id: Uuid::new_v4(),
        theatre_id: theatre.id,
        name: "Hall 1".to_string(),
        row_count: 5,
        column_count: 8,
    };
    let seats = seat_grid(&hall);

    let show_times = [2_i64, 5, 8]
        .iter()
        .map(|offset_hours| {
            let start = from + Duration::hours(*offset_hours);
            ShowTime {
                id: Uuid::new_v4(),
                movie_id: movie.id,
                hall_id: hall.id,
                start_time: start,
                end_time: start + Duration::minutes(movie.duration_minutes as i64),
                base_price_cents: 1250,
            }
        })
        .collect();

    SampleCinema {
        theatre,
        movie,
        hall,
        seats,
        show_times,
    }
}
