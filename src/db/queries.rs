pub const SELECT_OPEN_TRIPS_FOR_VEHICLE: &str = r#"
SELECT trip_id, vehicle_plate, actual_start_time, actual_end_time
FROM trips
WHERE vehicle_plate = $1 AND actual_end_time IS NULL;
"#;

pub const SELECT_ACTIVE_TRIPS: &str = r#"
SELECT trip_id, vehicle_plate, actual_start_time, actual_end_time
FROM trips
WHERE actual_end_time IS NULL;
"#;

pub const SELECT_TRIP: &str = r#"
SELECT trip_id, vehicle_plate, actual_start_time, actual_end_time
FROM trips
WHERE trip_id = $1;
"#;

pub const UPDATE_TRIP_START: &str = r#"
UPDATE trips
SET actual_start_time = $2
WHERE trip_id = $1 AND actual_start_time IS NULL;
"#;

pub const UPDATE_TRIP_END: &str = r#"
UPDATE trips
SET actual_end_time = $2
WHERE trip_id = $1 AND actual_end_time IS NULL;
"#;

pub const FINALIZE_TRIP: &str = r#"
SELECT finalize_trip($1);
"#;

pub const SELECT_INCOMPLETE_STOPS: &str = r#"
SELECT trip_id, customer_code, latitude, longitude, completed, completed_at
FROM trip_customers
WHERE trip_id = $1 AND completed = false;
"#;

pub const UPDATE_STOP_COMPLETED: &str = r#"
UPDATE trip_customers
SET completed = true,
    completed_at = $3
WHERE trip_id = $1 AND customer_code = $2 AND completed = false;
"#;

pub const COUNT_COMPLETED_STOPS: &str = r#"
SELECT COUNT(*) FROM trip_customers WHERE trip_id = $1 AND completed = true;
"#;

pub const COUNT_TOTAL_STOPS: &str = r#"
SELECT COUNT(*) FROM trip_customers WHERE trip_id = $1;
"#;

pub const INSERT_TRIP_POINT: &str = r#"
INSERT INTO trip_coordinates (trip_id, plate, lat, lon, speed, loc_time)
VALUES ($1, $2, $3, $4, $5, $6);
"#;

pub const SELECT_TRIP_POINTS: &str = r#"
SELECT trip_id, plate, lat, lon, speed, loc_time
FROM trip_coordinates
WHERE trip_id = $1
ORDER BY loc_time ASC;
"#;
